/// Per-provider `auth` constants recognized in `storageParameters` (§6.2).
/// Each provider has a default chain tried when `auth` is unspecified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OciAuthType {
    Instance,
    User,
    Resource,
    Workload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwsAuthType {
    AccessKey,
    InstanceProfile,
    AssumeRole,
    WebIdentity,
    Ecs,
    Process,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcpAuthType {
    ServiceAccount,
    WorkloadIdentity,
    ApplicationDefault,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AzureAuthType {
    ManagedIdentity,
    ServicePrincipal,
    Device,
    ClientSecret,
    ClientCertificate,
    Default,
    AccountKey,
    PodIdentity,
}

fn parse_or_default<T: Copy>(raw: Option<&str>, table: &[(&str, T)], default: T) -> T {
    match raw {
        Some(v) => table
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(v))
            .map(|(_, t)| *t)
            .unwrap_or(default),
        None => default,
    }
}

impl OciAuthType {
    /// Default chain: instance -> resource (§6.2).
    pub const DEFAULT_CHAIN: [OciAuthType; 2] = [OciAuthType::Instance, OciAuthType::Resource];

    pub fn parse(raw: Option<&str>) -> Self {
        parse_or_default(
            raw,
            &[
                ("instance", OciAuthType::Instance),
                ("user", OciAuthType::User),
                ("resource", OciAuthType::Resource),
                ("workload", OciAuthType::Workload),
            ],
            OciAuthType::Instance,
        )
    }

    /// `(primary, fallback)`: when `raw` is unset, the default chain supplies
    /// both; an explicit choice carries no fallback of its own (§6.2 "Default
    /// chains when auth is unspecified include a two-step fallback").
    pub fn resolve(raw: Option<&str>) -> (Self, Option<Self>) {
        match raw {
            None => (Self::DEFAULT_CHAIN[0], Some(Self::DEFAULT_CHAIN[1])),
            Some(_) => (Self::parse(raw), None),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OciAuthType::Instance => "instance",
            OciAuthType::User => "user",
            OciAuthType::Resource => "resource",
            OciAuthType::Workload => "workload",
        }
    }
}

impl AwsAuthType {
    /// Default chain: instance-profile -> default (env/profile) resolution.
    pub const DEFAULT_CHAIN: [AwsAuthType; 2] = [AwsAuthType::InstanceProfile, AwsAuthType::Default];

    pub fn parse(raw: Option<&str>) -> Self {
        parse_or_default(
            raw,
            &[
                ("access-key", AwsAuthType::AccessKey),
                ("instance-profile", AwsAuthType::InstanceProfile),
                ("assume-role", AwsAuthType::AssumeRole),
                ("web-identity", AwsAuthType::WebIdentity),
                ("ecs", AwsAuthType::Ecs),
                ("process", AwsAuthType::Process),
                ("default", AwsAuthType::Default),
            ],
            AwsAuthType::Default,
        )
    }

    pub fn resolve(raw: Option<&str>) -> (Self, Option<Self>) {
        match raw {
            None => (Self::DEFAULT_CHAIN[0], Some(Self::DEFAULT_CHAIN[1])),
            Some(_) => (Self::parse(raw), None),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AwsAuthType::AccessKey => "access-key",
            AwsAuthType::InstanceProfile => "instance-profile",
            AwsAuthType::AssumeRole => "assume-role",
            AwsAuthType::WebIdentity => "web-identity",
            AwsAuthType::Ecs => "ecs",
            AwsAuthType::Process => "process",
            AwsAuthType::Default => "default",
        }
    }
}

impl GcpAuthType {
    /// Default chain: workload-identity -> application-default.
    pub const DEFAULT_CHAIN: [GcpAuthType; 2] = [GcpAuthType::WorkloadIdentity, GcpAuthType::ApplicationDefault];

    pub fn parse(raw: Option<&str>) -> Self {
        parse_or_default(
            raw,
            &[
                ("service-account", GcpAuthType::ServiceAccount),
                ("workload-identity", GcpAuthType::WorkloadIdentity),
                ("application-default", GcpAuthType::ApplicationDefault),
                ("default", GcpAuthType::Default),
            ],
            GcpAuthType::Default,
        )
    }

    pub fn resolve(raw: Option<&str>) -> (Self, Option<Self>) {
        match raw {
            None => (Self::DEFAULT_CHAIN[0], Some(Self::DEFAULT_CHAIN[1])),
            Some(_) => (Self::parse(raw), None),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GcpAuthType::ServiceAccount => "service-account",
            GcpAuthType::WorkloadIdentity => "workload-identity",
            GcpAuthType::ApplicationDefault => "application-default",
            GcpAuthType::Default => "default",
        }
    }
}

impl AzureAuthType {
    /// Default chain: managed-identity -> default (env chain).
    pub const DEFAULT_CHAIN: [AzureAuthType; 2] = [AzureAuthType::ManagedIdentity, AzureAuthType::Default];

    pub fn parse(raw: Option<&str>) -> Self {
        parse_or_default(
            raw,
            &[
                ("managed-identity", AzureAuthType::ManagedIdentity),
                ("service-principal", AzureAuthType::ServicePrincipal),
                ("device", AzureAuthType::Device),
                ("client-secret", AzureAuthType::ClientSecret),
                ("client-certificate", AzureAuthType::ClientCertificate),
                ("default", AzureAuthType::Default),
                ("account-key", AzureAuthType::AccountKey),
                ("pod-identity", AzureAuthType::PodIdentity),
            ],
            AzureAuthType::Default,
        )
    }

    pub fn resolve(raw: Option<&str>) -> (Self, Option<Self>) {
        match raw {
            None => (Self::DEFAULT_CHAIN[0], Some(Self::DEFAULT_CHAIN[1])),
            Some(_) => (Self::parse(raw), None),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AzureAuthType::ManagedIdentity => "managed-identity",
            AzureAuthType::ServicePrincipal => "service-principal",
            AzureAuthType::Device => "device",
            AzureAuthType::ClientSecret => "client-secret",
            AzureAuthType::ClientCertificate => "client-certificate",
            AzureAuthType::Default => "default",
            AzureAuthType::AccountKey => "account-key",
            AzureAuthType::PodIdentity => "pod-identity",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unspecified_auth_resolves_to_default_chain() {
        assert_eq!(
            OciAuthType::resolve(None),
            (OciAuthType::Instance, Some(OciAuthType::Resource))
        );
        assert_eq!(
            AwsAuthType::resolve(None),
            (AwsAuthType::InstanceProfile, Some(AwsAuthType::Default))
        );
        assert_eq!(
            GcpAuthType::resolve(None),
            (GcpAuthType::WorkloadIdentity, Some(GcpAuthType::ApplicationDefault))
        );
        assert_eq!(
            AzureAuthType::resolve(None),
            (AzureAuthType::ManagedIdentity, Some(AzureAuthType::Default))
        );
    }

    #[test]
    fn explicit_auth_has_no_fallback() {
        assert_eq!(AwsAuthType::resolve(Some("access-key")), (AwsAuthType::AccessKey, None));
        assert_eq!(
            AzureAuthType::resolve(Some("service-principal")),
            (AzureAuthType::ServicePrincipal, None)
        );
    }

    #[test]
    fn as_str_round_trips_through_parse() {
        for variant in [
            AwsAuthType::AccessKey,
            AwsAuthType::InstanceProfile,
            AwsAuthType::AssumeRole,
            AwsAuthType::WebIdentity,
            AwsAuthType::Ecs,
            AwsAuthType::Process,
            AwsAuthType::Default,
        ] {
            assert_eq!(AwsAuthType::parse(Some(variant.as_str())), variant);
        }
    }
}
