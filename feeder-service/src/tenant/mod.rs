//! Per-request tenant scoping.
//!
//! A standard identity is bound to one tenant id. The administrative
//! identity names its target companies on every request; names are
//! looked up in the company directory and unknown ones are dropped.

pub mod overrides;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::sources::SchemaVariant;

pub use overrides::{lookup_regions, RegionAnswer, RegionQuery, ScopeOverride};

/// An authenticated caller, as handed over by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Identity {
    pub email: String,
    pub tenant_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Company {
    pub name: String,
    pub tenant_id: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub private: bool,
}

/// A company an administrative request fans out to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanyTarget {
    pub tenant_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct CompanyDirectory {
    companies: Vec<Company>,
}

impl CompanyDirectory {
    pub fn new(companies: Vec<Company>) -> Self {
        Self { companies }
    }

    /// Map display names to targets in directory order. Unknown names are
    /// dropped. A tenant listed under several requested names is kept once,
    /// under the first of those names in the directory.
    pub fn targets(&self, names: &[String]) -> Vec<CompanyTarget> {
        let mut out: Vec<CompanyTarget> = Vec::new();
        for company in &self.companies {
            if !names.iter().any(|n| n.trim() == company.name) {
                continue;
            }
            if out.iter().any(|t| t.tenant_id == company.tenant_id) {
                continue;
            }
            out.push(CompanyTarget {
                tenant_id: company.tenant_id,
                name: company.name.clone(),
            });
        }
        out
    }

    pub fn private_names(&self) -> Vec<String> {
        self.companies
            .iter()
            .filter(|c| c.private)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn is_private(&self, tenant_id: i64) -> bool {
        self.companies.iter().any(|c| c.private && c.tenant_id == tenant_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantKind {
    Public,
    Private,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantContext {
    pub tenant_id: i64,
    pub kind: TenantKind,
    /// Companies named by an administrative request; always empty otherwise.
    pub targets: Vec<CompanyTarget>,
}

impl TenantContext {
    pub fn is_admin(&self) -> bool {
        self.kind == TenantKind::Admin
    }

    /// Private tenants upload the simple export, everyone else the legacy one.
    pub fn import_variant(&self) -> SchemaVariant {
        match self.kind {
            TenantKind::Private => SchemaVariant::Simple,
            TenantKind::Public | TenantKind::Admin => SchemaVariant::Legacy,
        }
    }
}

pub struct TenantScopeResolver {
    directory: CompanyDirectory,
    admin_emails: Vec<String>,
    overrides: HashMap<String, ScopeOverride>,
    tokens: HashMap<String, Identity>,
}

impl TenantScopeResolver {
    pub fn new(
        directory: CompanyDirectory,
        admin_emails: Vec<String>,
        overrides: Vec<ScopeOverride>,
        tokens: HashMap<String, Identity>,
    ) -> Self {
        Self {
            directory,
            admin_emails: admin_emails.into_iter().map(|e| e.to_lowercase()).collect(),
            overrides: overrides.into_iter().map(|o| (o.email.to_lowercase(), o)).collect(),
            tokens,
        }
    }

    pub fn directory(&self) -> &CompanyDirectory {
        &self.directory
    }

    pub fn authenticate(&self, token: &str) -> Option<&Identity> {
        self.tokens.get(token)
    }

    pub fn is_admin(&self, identity: &Identity) -> bool {
        self.admin_emails.contains(&identity.email.to_lowercase())
    }

    /// Build the scope for one request. `requested_companies` only matters
    /// for the administrative identity.
    pub fn resolve(&self, identity: &Identity, requested_companies: &[String]) -> TenantContext {
        if self.is_admin(identity) {
            let targets = self.directory.targets(requested_companies);
            if targets.len() < requested_companies.len() {
                tracing::debug!(
                    requested = requested_companies.len(),
                    known = targets.len(),
                    "unknown company names dropped"
                );
            }
            return TenantContext {
                tenant_id: identity.tenant_id,
                kind: TenantKind::Admin,
                targets,
            };
        }

        let kind = if self.directory.is_private(identity.tenant_id) {
            TenantKind::Private
        } else {
            TenantKind::Public
        };
        TenantContext {
            tenant_id: identity.tenant_id,
            kind,
            targets: Vec::new(),
        }
    }

    /// Fixed region/feeder scope for demo accounts, if any.
    pub fn override_for(&self, identity: &Identity) -> Option<&ScopeOverride> {
        self.overrides.get(&identity.email.to_lowercase())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub fn directory() -> CompanyDirectory {
        CompanyDirectory::new(vec![
            Company {
                name: "Tehran".to_string(),
                tenant_id: 3,
                email: None,
                private: false,
            },
            Company {
                name: "Mobarakeh Steel".to_string(),
                tenant_id: 101,
                email: Some("steel@example.com".to_string()),
                private: true,
            },
            Company {
                name: "Isfahan".to_string(),
                tenant_id: 7,
                email: None,
                private: false,
            },
        ])
    }

    pub fn resolver() -> TenantScopeResolver {
        let mut tokens = HashMap::new();
        tokens.insert(
            "admin-token".to_string(),
            Identity {
                email: "admin@example.com".to_string(),
                tenant_id: 0,
            },
        );
        tokens.insert(
            "steel-token".to_string(),
            Identity {
                email: "steel@example.com".to_string(),
                tenant_id: 101,
            },
        );
        tokens.insert(
            "tehran-token".to_string(),
            Identity {
                email: "ops@tehran.example.com".to_string(),
                tenant_id: 3,
            },
        );
        TenantScopeResolver::new(
            directory(),
            vec!["Admin@Example.com".to_string()],
            vec![ScopeOverride {
                email: "demo@example.com".to_string(),
                regions: vec![1],
                feeders: vec!["1".to_string(), "32".to_string()],
            }],
            tokens,
        )
    }
}
