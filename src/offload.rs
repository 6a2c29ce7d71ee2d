//! Delegating byte delivery to the front-end server.
//!
//! Apache (with `mod_xsendfile`) and LiteSpeed accept an `X-Sendfile` header
//! carrying the filesystem path. Nginx accepts `X-Accel-Redirect` with an
//! internal location URI, which only works when the reverse proxy was set up
//! for it, so the host must opt in and supply the URI prefix.

use std::collections::BTreeSet;
use std::path::Path;

use axum::http::HeaderName;

pub const X_SENDFILE: HeaderName = HeaderName::from_static("x-sendfile");
pub const X_ACCEL_REDIRECT: HeaderName = HeaderName::from_static("x-accel-redirect");

/// Apache module that implements `X-Sendfile`.
pub const XSENDFILE_MODULE: &str = "mod_xsendfile";

/// Family of the hosting front-end server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerKind {
    Apache,
    Nginx,
    LiteSpeed,
    Other,
}

impl ServerKind {
    /// Classifies a `SERVER_SOFTWARE`-style identity string.
    pub fn from_software(identity: &str) -> Self {
        let identity = identity.to_ascii_lowercase();
        if identity.contains("litespeed") {
            ServerKind::LiteSpeed
        } else if identity.contains("nginx") {
            ServerKind::Nginx
        } else if identity.contains("apache") {
            ServerKind::Apache
        } else {
            ServerKind::Other
        }
    }
}

/// Read-only description of the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEnvironment {
    pub software_identity: String,
    pub kind: ServerKind,
    pub module_capabilities: BTreeSet<String>,
}

impl ServerEnvironment {
    pub fn new<I, S>(software_identity: impl Into<String>, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let software_identity = software_identity.into();
        ServerEnvironment {
            kind: ServerKind::from_software(&software_identity),
            software_identity,
            module_capabilities: modules.into_iter().map(Into::into).collect(),
        }
    }

    /// A host with no front-end server, e.g. axum serving directly.
    pub fn standalone() -> Self {
        ServerEnvironment::new("", Vec::<String>::new())
    }

    pub fn has_module(&self, module: &str) -> bool {
        self.module_capabilities.contains(module)
    }
}

impl Default for ServerEnvironment {
    fn default() -> Self {
        ServerEnvironment::standalone()
    }
}

/// Host decisions the detector cannot make by itself.
pub trait OffloadHooks: Send + Sync {
    /// Whether the Nginx reverse proxy is configured for `X-Accel-Redirect`.
    fn nginx_enabled(&self) -> bool;

    /// Internal location for `file_name`, i.e. the configured prefix joined
    /// with the base name.
    fn nginx_internal_uri(&self, file_name: &str) -> Option<String>;
}

/// Hooks that never enable Nginx offload.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl OffloadHooks for NoHooks {
    fn nginx_enabled(&self) -> bool {
        false
    }

    fn nginx_internal_uri(&self, _file_name: &str) -> Option<String> {
        None
    }
}

/// Nginx hooks driven by static configuration.
#[derive(Debug, Clone, Default)]
pub struct PrefixHooks {
    pub enabled: bool,
    pub internal_prefix: Option<String>,
}

impl OffloadHooks for PrefixHooks {
    fn nginx_enabled(&self) -> bool {
        self.enabled
    }

    fn nginx_internal_uri(&self, file_name: &str) -> Option<String> {
        self.internal_prefix
            .as_ref()
            .map(|prefix| format!("{prefix}{file_name}"))
    }
}

/// The chosen delegation, one header to emit in place of the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Offload {
    /// `X-Sendfile` with the literal filesystem path (Apache, LiteSpeed).
    Sendfile(String),
    /// `X-Accel-Redirect` with an internal URI (Nginx).
    AccelRedirect(String),
}

impl Offload {
    pub fn header_name(&self) -> HeaderName {
        match self {
            Offload::Sendfile(_) => X_SENDFILE,
            Offload::AccelRedirect(_) => X_ACCEL_REDIRECT,
        }
    }

    pub fn header_value(&self) -> &str {
        match self {
            Offload::Sendfile(value) | Offload::AccelRedirect(value) => value,
        }
    }
}

/// Picks the delegation mechanism for `path`, if the host supports one.
pub fn detect(env: &ServerEnvironment, hooks: &dyn OffloadHooks, path: &Path) -> Option<Offload> {
    match env.kind {
        ServerKind::Apache if env.has_module(XSENDFILE_MODULE) => {
            Some(Offload::Sendfile(path.to_string_lossy().into_owned()))
        }
        ServerKind::LiteSpeed => Some(Offload::Sendfile(path.to_string_lossy().into_owned())),
        ServerKind::Nginx if hooks.nginx_enabled() => {
            let file_name = path.file_name()?.to_string_lossy();
            hooks.nginx_internal_uri(&file_name).map(Offload::AccelRedirect)
        }
        _ => None,
    }
}
