//! Custom domains.
//!
//! A custom domain is resolved in two steps. [`plan_domain`] validates the
//! configuration and looks up the hosted zone without declaring anything.
//! [`declare_domain`] then declares the certificate, the domain name, the
//! API mapping and the alias record.

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use httpapi_common::ConstructError;
use httpapi_core::dns::normalize_zone_name;
use httpapi_core::{HostedZone, LogicalId, Resource, Scope, get_att, reference};

/// A custom domain for an API.
///
/// A bare name (`"api.domain.com"`) is served from the parent zone
/// (`domain.com`) with no mapping path.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CustomDomain {
    /// A domain name.
    Name(String),
    /// A domain name with options.
    Options(CustomDomainOptions),
}

impl From<&str> for CustomDomain {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<CustomDomainOptions> for CustomDomain {
    fn from(options: CustomDomainOptions) -> Self {
        Self::Options(options)
    }
}

/// Custom domain options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomDomainOptions {
    /// Fully qualified domain name.
    pub domain_name: String,

    /// Hosted zone the domain lives in; the parent zone when unset.
    #[serde(default)]
    pub hosted_zone: Option<String>,

    /// Mapping path under the domain.
    #[serde(default)]
    pub path: Option<String>,

    /// Existing certificate; one is requested when unset.
    #[serde(default)]
    pub certificate_arn: Option<String>,
}

impl CustomDomainOptions {
    /// Options for `domain_name` with every other field unset.
    pub fn new(domain_name: impl Into<String>) -> Self {
        Self {
            domain_name: domain_name.into(),
            hosted_zone: None,
            path: None,
            certificate_arn: None,
        }
    }

    /// Set the hosted zone.
    #[must_use]
    pub fn hosted_zone(mut self, zone: impl Into<String>) -> Self {
        self.hosted_zone = Some(zone.into());
        self
    }

    /// Set the mapping path.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Use an existing certificate.
    #[must_use]
    pub fn certificate_arn(mut self, arn: impl Into<String>) -> Self {
        self.certificate_arn = Some(arn.into());
        self
    }
}

/// A validated custom domain with its hosted zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlannedDomain {
    pub domain_name: String,
    pub zone: HostedZone,
    pub path: Option<String>,
    pub certificate_arn: Option<String>,
}

impl PlannedDomain {
    /// The URL the API is served from.
    pub fn url(&self) -> String {
        match &self.path {
            Some(path) => format!("https://{}/{path}", self.domain_name),
            None => format!("https://{}", self.domain_name),
        }
    }
}

/// Logical ids of the resources declared for a custom domain.
#[derive(Debug, Clone)]
pub struct DomainResources {
    /// The requested certificate; `None` when an existing one was supplied.
    pub certificate: Option<LogicalId>,
    pub domain_name: LogicalId,
    pub api_mapping: LogicalId,
    /// The alias record in the hosted zone.
    pub record: LogicalId,
}

/// Strip the leftmost label of a domain name.
///
/// Returns `None` for names with fewer than two labels left over.
pub fn parent_zone(domain_name: &str) -> Option<String> {
    let name = normalize_zone_name(domain_name);
    let (_, parent) = name.split_once('.')?;
    if parent.is_empty() || !parent.contains('.') || parent.split('.').any(str::is_empty) {
        return None;
    }
    Some(parent.to_string())
}

/// Validate a custom domain and resolve its hosted zone.
pub(crate) fn plan_domain(
    scope: &Scope,
    domain: CustomDomain,
) -> Result<PlannedDomain, ConstructError> {
    let options = match domain {
        CustomDomain::Name(name) => CustomDomainOptions::new(name),
        CustomDomain::Options(options) => options,
    };

    let domain_name = normalize_zone_name(&options.domain_name);
    if domain_name.is_empty() || domain_name.split('.').any(str::is_empty) {
        return Err(ConstructError::InvalidDomainName {
            domain: options.domain_name,
        });
    }

    let zone_name = match options.hosted_zone {
        Some(zone) => normalize_zone_name(&zone),
        None => parent_zone(&domain_name).ok_or_else(|| ConstructError::InvalidDomainName {
            domain: options.domain_name.clone(),
        })?,
    };

    let zone = scope
        .stack()
        .lookup_hosted_zone(&zone_name)
        .ok_or_else(|| ConstructError::hosted_zone_not_found(&zone_name))?;

    let path = options
        .path
        .map(|p| p.trim_matches('/').to_string())
        .filter(|p| !p.is_empty());

    debug!(
        domain = %domain_name,
        zone = %zone.zone_name,
        zone_id = %zone.zone_id,
        path = ?path,
        "Resolved custom domain"
    );

    Ok(PlannedDomain {
        domain_name,
        zone,
        path,
        certificate_arn: options.certificate_arn,
    })
}

/// Declare the resources serving `domain` in front of the API.
///
/// `api_id` and `stage` reference the HTTP API and its default stage.
pub(crate) fn declare_domain(
    scope: &Scope,
    domain: &PlannedDomain,
    api_id: &Value,
    stage: Option<&LogicalId>,
) -> Result<DomainResources, ConstructError> {
    let (certificate, certificate_arn) = match &domain.certificate_arn {
        Some(arn) => (None, json!(arn)),
        None => {
            let id = scope.child("Certificate").declare(Resource::new(
                "AWS::CertificateManager::Certificate",
                json!({
                    "DomainName": domain.domain_name,
                    "DomainValidationOptions": [{
                        "DomainName": domain.domain_name,
                        "HostedZoneId": domain.zone.zone_id,
                    }],
                    "ValidationMethod": "DNS",
                }),
            ))?;
            let arn = reference(&id);
            (Some(id), arn)
        }
    };

    let mut domain_name = Resource::new(
        "AWS::ApiGatewayV2::DomainName",
        json!({
            "DomainName": domain.domain_name,
            "DomainNameConfigurations": [{
                "CertificateArn": certificate_arn,
                "EndpointType": "REGIONAL",
            }],
        }),
    );
    if let Some(certificate) = &certificate {
        domain_name = domain_name.depends_on(certificate.clone());
    }
    let domain_name_id = scope.child("DomainName").declare(domain_name)?;

    let mut mapping_properties = json!({
        "ApiId": api_id,
        "DomainName": domain.domain_name,
        "Stage": "$default",
    });
    if let Some(path) = &domain.path {
        mapping_properties["ApiMappingKey"] = json!(path);
    }
    let mut mapping = Resource::new("AWS::ApiGatewayV2::ApiMapping", mapping_properties)
        .depends_on(domain_name_id.clone());
    if let Some(stage) = stage {
        mapping = mapping.depends_on(stage.clone());
    }
    let api_mapping = scope.child("ApiMapping").declare(mapping)?;

    let record = scope.child("AliasRecord").declare(Resource::new(
        "AWS::Route53::RecordSet",
        json!({
            "Name": format!("{}.", domain.domain_name),
            "Type": "A",
            "AliasTarget": {
                "DNSName": get_att(&domain_name_id, "RegionalDomainName"),
                "HostedZoneId": get_att(&domain_name_id, "RegionalHostedZoneId"),
            },
            "HostedZoneId": domain.zone.zone_id,
        }),
    ))?;

    debug!(domain = %domain.domain_name, "Declared custom domain");

    Ok(DomainResources {
        certificate,
        domain_name: domain_name_id,
        api_mapping,
        record,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpapi_common::AppConfig;
    use httpapi_core::{StaticZoneLookup, Stack};

    fn stack() -> Stack {
        Stack::with_zone_lookup(
            "stack",
            AppConfig::default(),
            StaticZoneLookup::new()
                .with_zone(HostedZone::new("Z1", "domain.com"))
                .with_zone(HostedZone::new("Z2", "api.domain.com")),
        )
    }

    #[test]
    fn test_parent_zone() {
        assert_eq!(parent_zone("api.domain.com").as_deref(), Some("domain.com"));
        assert_eq!(parent_zone("a.b.domain.com.").as_deref(), Some("b.domain.com"));
        assert_eq!(parent_zone("domain.com"), None);
        assert_eq!(parent_zone("localhost"), None);
    }

    #[test]
    fn test_plan_bare_name() {
        let stack = stack();
        let planned = plan_domain(&stack.root(), "api.domain.com".into()).unwrap();

        assert_eq!(planned.domain_name, "api.domain.com");
        assert_eq!(planned.zone.zone_id, "Z1");
        assert_eq!(planned.path, None);
        assert_eq!(planned.url(), "https://api.domain.com");
    }

    #[test]
    fn test_plan_explicit_zone_and_path() {
        let stack = stack();
        let options = CustomDomainOptions::new("v1.api.domain.com")
            .hosted_zone("api.domain.com")
            .path("/users/");

        let planned = plan_domain(&stack.root(), options.into()).unwrap();
        assert_eq!(planned.zone.zone_id, "Z2");
        assert_eq!(planned.path.as_deref(), Some("users"));
        assert_eq!(planned.url(), "https://v1.api.domain.com/users");
    }

    #[test]
    fn test_plan_missing_zone() {
        let stack = stack();
        let err = plan_domain(&stack.root(), "api.other.com".into()).unwrap_err();

        assert_eq!(err, ConstructError::hosted_zone_not_found("other.com"));
        assert!(err.to_string().contains("other.com"));
    }

    #[test]
    fn test_plan_invalid_domain() {
        let stack = stack();

        let err = plan_domain(&stack.root(), "localhost".into()).unwrap_err();
        assert!(matches!(err, ConstructError::InvalidDomainName { .. }));

        let err = plan_domain(&stack.root(), "api..domain.com".into()).unwrap_err();
        assert!(matches!(err, ConstructError::InvalidDomainName { .. }));
    }

    #[test]
    fn test_plan_declares_nothing() {
        let stack = stack();
        plan_domain(&stack.root(), "api.domain.com".into()).unwrap();
        assert_eq!(stack.resource_count(), 0);
    }

    #[test]
    fn test_declare_domain() {
        let stack = stack();
        let scope = stack.root().child("Api");
        let planned = plan_domain(&scope, "api.domain.com".into()).unwrap();

        let resources = declare_domain(&scope, &planned, &json!({ "Ref": "Api" }), None).unwrap();
        let template = stack.synthesize();

        assert_eq!(template.count_of_type("AWS::CertificateManager::Certificate"), 1);
        let certificate = template.get(resources.certificate.as_ref().unwrap()).unwrap();
        assert_eq!(certificate.properties["ValidationMethod"], json!("DNS"));
        assert_eq!(
            certificate.properties["DomainValidationOptions"][0]["HostedZoneId"],
            json!("Z1")
        );

        let mapping = template.get(&resources.api_mapping).unwrap();
        assert_eq!(mapping.properties["Stage"], json!("$default"));
        assert!(mapping.property("ApiMappingKey").is_none());

        let record = template.get(&resources.record).unwrap();
        assert_eq!(record.properties["Name"], json!("api.domain.com."));
        assert_eq!(record.properties["Type"], json!("A"));
        assert_eq!(record.properties["HostedZoneId"], json!("Z1"));

        let domain = template.get(&resources.domain_name).unwrap();
        assert_eq!(
            domain.properties["DomainNameConfigurations"][0]["EndpointType"],
            json!("REGIONAL")
        );
    }

    #[test]
    fn test_declare_with_certificate_arn() {
        let stack = stack();
        let scope = stack.root().child("Api");
        let options = CustomDomainOptions::new("api.domain.com")
            .path("users")
            .certificate_arn("arn:aws:acm:us-east-1:123:certificate/abc");
        let planned = plan_domain(&scope, options.into()).unwrap();

        let resources = declare_domain(&scope, &planned, &json!("api"), None).unwrap();
        let template = stack.synthesize();

        assert!(resources.certificate.is_none());
        assert_eq!(template.count_of_type("AWS::CertificateManager::Certificate"), 0);
        assert_eq!(
            template.get(&resources.domain_name).unwrap().properties["DomainNameConfigurations"]
                [0]["CertificateArn"],
            json!("arn:aws:acm:us-east-1:123:certificate/abc")
        );
        assert_eq!(
            template.get(&resources.api_mapping).unwrap().properties["ApiMappingKey"],
            json!("users")
        );
    }

    #[test]
    fn test_deserialize_custom_domain() {
        #[derive(Deserialize)]
        struct Wrapper {
            custom_domain: CustomDomain,
        }

        let bare: Wrapper = toml::from_str(r#"custom_domain = "api.domain.com""#).unwrap();
        assert_eq!(bare.custom_domain, CustomDomain::from("api.domain.com"));

        let options: Wrapper = toml::from_str(
            r#"custom_domain = { domain_name = "api.domain.com", path = "users" }"#,
        )
        .unwrap();
        assert_eq!(
            options.custom_domain,
            CustomDomain::Options(CustomDomainOptions::new("api.domain.com").path("users"))
        );
    }
}
