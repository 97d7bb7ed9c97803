use crate::ModelResource;

/// Purpose the destination node plays for a given shape alias, e.g.
/// `serving` vs. `training`. Only `serving` triggers shape filtering today
/// (§4.D.2 step 3); other values pass every object through unfiltered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelPurpose {
    Serving,
    Other,
}

/// Narrows a bulk listing to a single hardware variant of a model (§3, §4.D.2
/// step 3). Never consulted unless `active`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeFilter {
    pub active: bool,
    pub shape_alias: String,
    pub model_purpose: ModelPurpose,
}

impl ShapeFilter {
    pub const fn inactive() -> Self {
        ShapeFilter {
            active: false,
            shape_alias: String::new(),
            model_purpose: ModelPurpose::Other,
        }
    }

    /// Objects are retained when their name contains `/<shapeAlias>/`, which
    /// is only consulted for `Serving` purpose tasks with an active filter.
    pub fn should_filter(&self) -> bool {
        self.active && self.model_purpose == ModelPurpose::Serving
    }

    pub fn matches(&self, object_name: &str) -> bool {
        if !self.should_filter() {
            return true;
        }
        object_name.contains(&format!("/{}/", self.shape_alias))
    }
}

/// Intent kind a worker acts on (§3, §4.D.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    Download,
    DownloadOverride,
    Delete,
}

/// An intent handed from the Watcher to a worker over one of the two Task
/// Channels. Carries exactly one resource variant, enforced by construction
/// through [`ModelResource`] rather than by a pair of optional fields.
#[derive(Debug, Clone)]
pub struct Task {
    pub task_type: TaskType,
    pub resource: ModelResource,
    pub shape_filter: ShapeFilter,
}

impl Task {
    pub fn new(task_type: TaskType, resource: ModelResource) -> Self {
        Task {
            task_type,
            resource,
            shape_filter: ShapeFilter::inactive(),
        }
    }

    pub fn with_shape_filter(mut self, filter: ShapeFilter) -> Self {
        self.shape_filter = filter;
        self
    }

    pub fn model_key(&self) -> String {
        self.resource.model_key()
    }

    pub fn uid(&self) -> &str {
        self.resource.uid()
    }
}
