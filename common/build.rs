use kube::CustomResourceExt;
use mmd_types::{BaseModel, ClusterBaseModel};
use std::fs;

fn main() {
    let _ = fs::create_dir("../crds");
    fs::write(
        "../crds/models.materializer.dev_basemodels_crd.yaml",
        serde_yaml::to_string(&BaseModel::crd()).unwrap(),
    )
    .unwrap();
    fs::write(
        "../crds/models.materializer.dev_clusterbasemodels_crd.yaml",
        serde_yaml::to_string(&ClusterBaseModel::crd()).unwrap(),
    )
    .unwrap();
}
