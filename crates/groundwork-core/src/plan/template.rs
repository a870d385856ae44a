//! Reverse-proxy server-block rendering.
//!
//! Each app gets one server block, rendered from its own template when
//! the inventory supplies one and from [`DEFAULT_SERVER_BLOCK`]
//! otherwise. The template sees the app name, domain, backend port and
//! the derived filesystem paths.

use minijinja::{Environment, context};

use crate::error::PlanError;
use crate::model::{AppDescriptor, AppPaths};

/// Plain HTTP front, upstream on loopback. TLS termination is left to
/// the operator's certificate tooling.
pub const DEFAULT_SERVER_BLOCK: &str = "\
server {
    listen 80;
    listen [::]:80;
    server_name {{ domain }};

    access_log {{ log_dir }}/proxy-access.log;
    error_log {{ log_dir }}/proxy-error.log;

    location / {
        proxy_pass http://127.0.0.1:{{ port }};
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
    }
}
";

pub(crate) fn render_server_block(app: &AppDescriptor) -> Result<String, PlanError> {
    let template_error = |source: minijinja::Error| PlanError::Template {
        app: app.name.clone(),
        source: Box::new(source),
    };

    let paths = AppPaths::derive(&app.name);
    let source = app.proxy_template.as_deref().unwrap_or(DEFAULT_SERVER_BLOCK);

    let mut env = Environment::new();
    env.add_template("server-block", source).map_err(template_error)?;
    let rendered = env
        .get_template("server-block")
        .map_err(template_error)?
        .render(context! {
            name => app.name,
            domain => app.domain,
            port => app.port,
            user => app.runtime_user(),
            code_dir => paths.code,
            config_dir => paths.config,
            log_dir => paths.log,
            data_dir => paths.data,
        })
        .map_err(template_error)?;

    // nginx is whitespace-tolerant but a missing trailing newline makes
    // concatenated configs run together in diagnostics.
    if rendered.ends_with('\n') {
        Ok(rendered)
    } else {
        Ok(format!("{rendered}\n"))
    }
}
