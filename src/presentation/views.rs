use crate::{
    application::error::HttpError,
    domain::tools::{OutputEncoding, ToolDescriptor, ToolRegistry},
};
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

/// One entry in the tool switcher.
#[derive(Clone)]
pub struct ToolLinkView {
    pub name: String,
    pub href: String,
    pub description: String,
    pub active: bool,
}

#[derive(Clone)]
pub struct DocumentationLinkView {
    pub label: String,
    pub href: String,
}

/// The tool the page is opened for.
#[derive(Clone)]
pub struct ActiveToolView {
    pub name: String,
    pub description: String,
    pub example: String,
    pub content_type: String,
    pub base64: bool,
    pub bg_color: String,
    pub documentation: Vec<DocumentationLinkView>,
    pub compile_href: String,
    pub save_href: String,
    pub load_href: String,
    pub render_href: String,
}

impl ActiveToolView {
    fn from_descriptor(tool: &ToolDescriptor) -> Self {
        let base = format!("/{}", tool.name);
        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            example: tool.example.clone(),
            content_type: tool.content_type().to_string(),
            base64: tool.output_encoding == OutputEncoding::Base64,
            bg_color: tool.bg_color.clone(),
            documentation: tool
                .documentation
                .iter()
                .map(|(label, href)| DocumentationLinkView {
                    label: label.clone(),
                    href: href.clone(),
                })
                .collect(),
            compile_href: format!("{base}/c"),
            save_href: format!("{base}/s"),
            load_href: format!("{base}/l/"),
            render_href: format!("{base}/d/"),
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub tools: Vec<ToolLinkView>,
    pub active: ActiveToolView,
}

impl IndexTemplate {
    /// Build the editor page for `active`, listing every registered tool.
    pub fn new(registry: &ToolRegistry, active: &ToolDescriptor) -> Self {
        let tools = registry
            .iter()
            .map(|tool| ToolLinkView {
                name: tool.name.clone(),
                href: format!("/{}", tool.name),
                description: tool.description.clone(),
                active: tool.name == active.name,
            })
            .collect();

        Self {
            tools,
            active: ActiveToolView::from_descriptor(active),
        }
    }
}
