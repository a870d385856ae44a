use serde::{Deserialize, Serialize};

/// One application to host. The name is the primary key every derived
/// value hangs off: directory paths, the runtime identity, the proxy
/// site file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppDescriptor {
    pub name: String,
    /// Runtime identity override. Defaults to the app name.
    #[serde(default)]
    pub run_user: Option<String>,
    /// Public hostname the reverse proxy answers for.
    pub domain: String,
    /// Local port the app listens on; the proxy upstreams to it.
    pub port: u16,
    /// Server-block template override. The config layer resolves a file
    /// reference into inline template source before planning; absent
    /// means the built-in template.
    #[serde(default)]
    pub proxy_template: Option<String>,
}

impl AppDescriptor {
    /// The low-privilege account the app runs as.
    pub fn runtime_user(&self) -> &str {
        self.run_user.as_deref().unwrap_or(&self.name)
    }
}

/// The four derived directories of an application.
///
/// Pure function of the name so every stage, template, and test resolves
/// the identical strings. Ownership contract: code and config belong to
/// the administration identity, log and data to the runtime identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppPaths {
    pub code: String,
    pub log: String,
    pub data: String,
    pub config: String,
}

impl AppPaths {
    pub fn derive(name: &str) -> Self {
        Self {
            code: format!("/opt/{name}"),
            log: format!("/var/log/{name}"),
            data: format!("/var/lib/{name}"),
            config: format!("/etc/{name}"),
        }
    }
}
