use std::collections::BTreeMap;
use std::fmt;

use crate::ParseError;

/// Backing store selected by a storage URI's scheme (§6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Oci,
    Aws,
    Gcp,
    Azure,
    Hub,
    SharedVolume,
    LocalPath,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Provider::Oci => "oci",
            Provider::Aws => "aws",
            Provider::Gcp => "gcp",
            Provider::Azure => "azure",
            Provider::Hub => "hub",
            Provider::SharedVolume => "pvc",
            Provider::LocalPath => "local",
        };
        f.write_str(s)
    }
}

/// Parsed form of a `storageUri` (§6, GLOSSARY). `extra` carries
/// provider-specific keys that don't fit the common shape: `project` (GCP),
/// `account` (Azure), `modelId`/`revision` (hub), `name`/`subpath` (pvc),
/// `path` (local).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectLocator {
    pub provider: Option<Provider>,
    pub namespace: Option<String>,
    pub bucket: String,
    pub prefix: String,
    pub region: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl ObjectLocator {
    fn normalize_prefix(prefix: &str) -> String {
        prefix.trim_start_matches('/').to_string()
    }

    pub fn parse(uri: &str) -> Result<Self, ParseError> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| ParseError::InvalidUri(uri.to_string()))?;

        match scheme {
            "oci" => Self::parse_oci(rest, uri),
            "s3" => Self::parse_s3(rest, uri),
            "aws" => Self::parse_aws(rest, uri),
            "gs" => Self::parse_gs(rest, uri),
            "gcp" => Self::parse_gcp(rest, uri),
            "az" => Self::parse_az(rest, uri),
            "azure" => Self::parse_azure(rest, uri),
            "hf" => Self::parse_hf(rest, uri),
            "pvc" => Self::parse_pvc(rest, uri),
            "local" => Self::parse_local(rest, uri),
            other => Err(ParseError::UnknownScheme(other.to_string())),
        }
    }

    /// `oci://n/<ns>/b/<bkt>/o/<prefix>` or `oci://<ns>@<region>/<bkt>/<prefix>`.
    fn parse_oci(rest: &str, original: &str) -> Result<Self, ParseError> {
        if let Some(stripped) = rest.strip_prefix("n/") {
            let (ns, rest) = stripped
                .split_once("/b/")
                .ok_or_else(|| ParseError::InvalidUri(original.to_string()))?;
            let (bucket, rest) = rest
                .split_once("/o/")
                .ok_or_else(|| ParseError::InvalidUri(original.to_string()))?;
            return Ok(ObjectLocator {
                provider: Some(Provider::Oci),
                namespace: Some(ns.to_string()),
                bucket: bucket.to_string(),
                prefix: Self::normalize_prefix(rest),
                region: None,
                extra: BTreeMap::new(),
            });
        }

        // regional: <ns>@<region>/<bkt>/<prefix>
        let (head, rest) = rest
            .split_once('/')
            .ok_or_else(|| ParseError::InvalidUri(original.to_string()))?;
        let (ns, region) = head
            .split_once('@')
            .ok_or_else(|| ParseError::InvalidUri(original.to_string()))?;
        let (bucket, prefix) = rest
            .split_once('/')
            .ok_or_else(|| ParseError::InvalidUri(original.to_string()))?;
        Ok(ObjectLocator {
            provider: Some(Provider::Oci),
            namespace: Some(ns.to_string()),
            bucket: bucket.to_string(),
            prefix: Self::normalize_prefix(prefix),
            region: Some(region.to_string()),
            extra: BTreeMap::new(),
        })
    }

    /// `s3://<bkt>/<prefix>`.
    fn parse_s3(rest: &str, original: &str) -> Result<Self, ParseError> {
        let (bucket, prefix) = rest
            .split_once('/')
            .ok_or_else(|| ParseError::InvalidUri(original.to_string()))?;
        Ok(ObjectLocator {
            provider: Some(Provider::Aws),
            namespace: None,
            bucket: bucket.to_string(),
            prefix: Self::normalize_prefix(prefix),
            region: None,
            extra: BTreeMap::new(),
        })
    }

    /// `aws://<region>/<bkt>/<prefix>`.
    ///
    /// The source this daemon replaces stripped the scheme and then split on
    /// the *first* slash to find the bucket, which mistook the region for
    /// part of the bucket name whenever a region was present. The region
    /// segment must be consumed before anything else is split out.
    fn parse_aws(rest: &str, original: &str) -> Result<Self, ParseError> {
        let (region, rest) = rest
            .split_once('/')
            .ok_or_else(|| ParseError::InvalidUri(original.to_string()))?;
        let (bucket, prefix) = rest
            .split_once('/')
            .ok_or_else(|| ParseError::InvalidUri(original.to_string()))?;
        Ok(ObjectLocator {
            provider: Some(Provider::Aws),
            namespace: None,
            bucket: bucket.to_string(),
            prefix: Self::normalize_prefix(prefix),
            region: Some(region.to_string()),
            extra: BTreeMap::new(),
        })
    }

    /// `gs://<bkt>/<prefix>`.
    fn parse_gs(rest: &str, original: &str) -> Result<Self, ParseError> {
        let (bucket, prefix) = rest
            .split_once('/')
            .ok_or_else(|| ParseError::InvalidUri(original.to_string()))?;
        Ok(ObjectLocator {
            provider: Some(Provider::Gcp),
            namespace: None,
            bucket: bucket.to_string(),
            prefix: Self::normalize_prefix(prefix),
            region: None,
            extra: BTreeMap::new(),
        })
    }

    /// `gcp://<project>/<bkt>/<prefix>`.
    fn parse_gcp(rest: &str, original: &str) -> Result<Self, ParseError> {
        let (project, rest) = rest
            .split_once('/')
            .ok_or_else(|| ParseError::InvalidUri(original.to_string()))?;
        let (bucket, prefix) = rest
            .split_once('/')
            .ok_or_else(|| ParseError::InvalidUri(original.to_string()))?;
        let mut extra = BTreeMap::new();
        extra.insert("project".to_string(), project.to_string());
        Ok(ObjectLocator {
            provider: Some(Provider::Gcp),
            namespace: None,
            bucket: bucket.to_string(),
            prefix: Self::normalize_prefix(prefix),
            region: None,
            extra,
        })
    }

    /// `az://<container>/<prefix>`.
    fn parse_az(rest: &str, original: &str) -> Result<Self, ParseError> {
        let (container, prefix) = rest
            .split_once('/')
            .ok_or_else(|| ParseError::InvalidUri(original.to_string()))?;
        Ok(ObjectLocator {
            provider: Some(Provider::Azure),
            namespace: None,
            bucket: container.to_string(),
            prefix: Self::normalize_prefix(prefix),
            region: None,
            extra: BTreeMap::new(),
        })
    }

    /// `azure://<account>/<container>/<prefix>`.
    fn parse_azure(rest: &str, original: &str) -> Result<Self, ParseError> {
        let (account, rest) = rest
            .split_once('/')
            .ok_or_else(|| ParseError::InvalidUri(original.to_string()))?;
        let (container, prefix) = rest
            .split_once('/')
            .ok_or_else(|| ParseError::InvalidUri(original.to_string()))?;
        let mut extra = BTreeMap::new();
        extra.insert("account".to_string(), account.to_string());
        Ok(ObjectLocator {
            provider: Some(Provider::Azure),
            namespace: None,
            bucket: container.to_string(),
            prefix: Self::normalize_prefix(prefix),
            region: None,
            extra,
        })
    }

    /// `hf://<owner>/<model>[@<revision>]`.
    fn parse_hf(rest: &str, original: &str) -> Result<Self, ParseError> {
        let (owner, model_and_rev) = rest
            .split_once('/')
            .ok_or_else(|| ParseError::InvalidUri(original.to_string()))?;
        let (model, revision) = match model_and_rev.split_once('@') {
            Some((m, r)) => (m, Some(r.to_string())),
            None => (model_and_rev, None),
        };
        let mut extra = BTreeMap::new();
        extra.insert("modelId".to_string(), format!("{owner}/{model}"));
        if let Some(rev) = revision {
            extra.insert("revision".to_string(), rev);
        }
        Ok(ObjectLocator {
            provider: Some(Provider::Hub),
            namespace: None,
            bucket: String::new(),
            prefix: String::new(),
            region: None,
            extra,
        })
    }

    /// `pvc://[<ns>:]<name>/<subpath>`.
    fn parse_pvc(rest: &str, original: &str) -> Result<Self, ParseError> {
        let (head, subpath) = rest
            .split_once('/')
            .ok_or_else(|| ParseError::InvalidUri(original.to_string()))?;
        let (namespace, name) = match head.split_once(':') {
            Some((ns, name)) => (Some(ns.to_string()), name.to_string()),
            None => (None, head.to_string()),
        };
        let mut extra = BTreeMap::new();
        extra.insert("name".to_string(), name);
        extra.insert("subpath".to_string(), subpath.to_string());
        Ok(ObjectLocator {
            provider: Some(Provider::SharedVolume),
            namespace,
            bucket: String::new(),
            prefix: String::new(),
            region: None,
            extra,
        })
    }

    /// `local://<absolutePath>`.
    fn parse_local(rest: &str, original: &str) -> Result<Self, ParseError> {
        if !rest.starts_with('/') {
            return Err(ParseError::InvalidUri(original.to_string()));
        }
        let mut extra = BTreeMap::new();
        extra.insert("path".to_string(), rest.to_string());
        Ok(ObjectLocator {
            provider: Some(Provider::LocalPath),
            namespace: None,
            bucket: String::new(),
            prefix: String::new(),
            region: None,
            extra,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_oci_explicit() {
        let loc = ObjectLocator::parse("oci://n/t1/b/models/o/llama-7b/").unwrap();
        assert_eq!(loc.provider, Some(Provider::Oci));
        assert_eq!(loc.namespace.as_deref(), Some("t1"));
        assert_eq!(loc.bucket, "models");
        assert_eq!(loc.prefix, "llama-7b/");
    }

    #[test]
    fn parses_oci_regional() {
        let loc = ObjectLocator::parse("oci://tenant@us-phoenix-1/models/llama-7b").unwrap();
        assert_eq!(loc.namespace.as_deref(), Some("tenant"));
        assert_eq!(loc.region.as_deref(), Some("us-phoenix-1"));
        assert_eq!(loc.bucket, "models");
        assert_eq!(loc.prefix, "llama-7b");
    }

    #[test]
    fn parses_s3() {
        let loc = ObjectLocator::parse("s3://my-bucket/path/to/model").unwrap();
        assert_eq!(loc.provider, Some(Provider::Aws));
        assert_eq!(loc.bucket, "my-bucket");
        assert_eq!(loc.prefix, "path/to/model");
        assert!(loc.region.is_none());
    }

    /// Regression test for the region/bucket separation bug (§6.1): the
    /// region must never leak into the bucket name.
    #[test]
    fn parses_aws_regional_without_bucket_corruption() {
        let loc = ObjectLocator::parse("aws://us-east-1/my-bucket/path/to/model").unwrap();
        assert_eq!(loc.region.as_deref(), Some("us-east-1"));
        assert_eq!(loc.bucket, "my-bucket");
        assert_eq!(loc.prefix, "path/to/model");
    }

    #[test]
    fn parses_hf_with_revision() {
        let loc = ObjectLocator::parse("hf://meta-llama/Llama-2-7b@main").unwrap();
        assert_eq!(loc.provider, Some(Provider::Hub));
        assert_eq!(loc.extra.get("modelId").map(String::as_str), Some("meta-llama/Llama-2-7b"));
        assert_eq!(loc.extra.get("revision").map(String::as_str), Some("main"));
    }

    #[test]
    fn parses_hf_without_revision() {
        let loc = ObjectLocator::parse("hf://meta-llama/Llama-2-7b").unwrap();
        assert!(!loc.extra.contains_key("revision"));
    }

    #[test]
    fn parses_pvc_with_namespace() {
        let loc = ObjectLocator::parse("pvc://team-a:shared-models/llama").unwrap();
        assert_eq!(loc.namespace.as_deref(), Some("team-a"));
        assert_eq!(loc.extra.get("name").map(String::as_str), Some("shared-models"));
        assert_eq!(loc.extra.get("subpath").map(String::as_str), Some("llama"));
    }

    #[test]
    fn parses_local() {
        let loc = ObjectLocator::parse("local:///mnt/models/llama").unwrap();
        assert_eq!(loc.extra.get("path").map(String::as_str), Some("/mnt/models/llama"));
    }

    #[test]
    fn rejects_relative_local_path() {
        assert!(ObjectLocator::parse("local://mnt/models").is_err());
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(matches!(
            ObjectLocator::parse("ftp://host/path"),
            Err(ParseError::UnknownScheme(_))
        ));
    }

    #[test]
    fn rejects_missing_scheme_separator() {
        assert!(matches!(
            ObjectLocator::parse("not-a-uri"),
            Err(ParseError::InvalidUri(_))
        ));
    }
}
