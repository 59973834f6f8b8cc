//! Message templates
//!
//! Templates use Handlebars syntax in strict mode, so a reference to a
//! field that is not in [`TemplateContext`] fails to render instead of
//! producing an empty string.
//!
//! The built-in `raw` block helper is replaced so that `{{raw}}` prints
//! the original log line; raw blocks are not available in templates.

use handlebars::{Context, Handlebars, Helper, HelperResult, Output, RenderContext, RenderError};
use serde::Serialize;

use crate::config::ServerConfig;
use crate::models::{Event, EventType};

/// Fields available to event templates
#[derive(Debug, Serialize)]
pub struct TemplateContext<'a> {
    pub server: &'a ServerConfig,
    pub event_type: EventType,
    pub ip: &'a str,
    pub location: &'a str,
    pub time: String,
    pub details: &'a str,
    pub raw: &'a str,
}

impl<'a> TemplateContext<'a> {
    pub fn new(server: &'a ServerConfig, event: &'a Event) -> Self {
        TemplateContext {
            server,
            event_type: event.event_type,
            ip: &event.address,
            location: &event.location,
            time: event.time_string(),
            details: &event.details,
            raw: &event.raw,
        }
    }

    /// The context as a flat JSON object, for message metadata
    pub fn to_metadata(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

pub struct TemplateRenderer {
    handlebars: Handlebars<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.register_helper("raw", Box::new(raw_line_helper));
        TemplateRenderer { handlebars }
    }

    pub fn render<T: Serialize>(&self, template: &str, data: &T) -> Result<String, RenderError> {
        self.handlebars.render_template(template, data)
    }
}

/// Writes the context's `raw` field; the helper name shadows it otherwise
fn raw_line_helper(
    _: &Helper,
    _: &Handlebars,
    ctx: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    if let Some(raw) = ctx.data().get("raw").and_then(|v| v.as_str()) {
        out.write(raw)?;
    }
    Ok(())
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};

    fn sample_event() -> Event {
        Event {
            event_type: EventType::Ban,
            address: "203.0.113.5".to_string(),
            location: "France-Paris".to_string(),
            details: "IP 203.0.113.5[France-Paris] 已被 fail2ban 封禁".to_string(),
            raw: "NOTICE [sshd] Ban 203.0.113.5 & <more>".to_string(),
            detected_at: Local.with_ymd_and_hms(2024, 3, 9, 8, 7, 6).unwrap(),
        }
    }

    fn server() -> ServerConfig {
        ServerConfig {
            name: "edge-1".to_string(),
            tag: "eu".to_string(),
        }
    }

    #[test]
    fn test_render_all_fields() {
        let event = sample_event();
        let server = server();
        let context = TemplateContext::new(&server, &event);

        let rendered = TemplateRenderer::new()
            .render(
                "[{{server.name}}/{{server.tag}}] {{event_type}} {{ip}} {{location}} at {{time}}: {{raw}}",
                &context,
            )
            .unwrap();
        assert_eq!(
            rendered,
            "[edge-1/eu] ban 203.0.113.5 France-Paris at 2024-03-09 08:07:06: NOTICE [sshd] Ban 203.0.113.5 & <more>"
        );
    }

    #[test]
    fn test_raw_field_is_not_shadowed() {
        let event = sample_event();
        let server = server();
        let context = TemplateContext::new(&server, &event);

        let rendered = TemplateRenderer::new()
            .render("raw=[{{raw}}] this.raw=[{{this.raw}}]", &context)
            .unwrap();
        assert_eq!(
            rendered,
            "raw=[NOTICE [sshd] Ban 203.0.113.5 & <more>] this.raw=[NOTICE [sshd] Ban 203.0.113.5 & <more>]"
        );
    }

    #[test]
    fn test_unknown_field_fails() {
        let event = sample_event();
        let server = server();
        let context = TemplateContext::new(&server, &event);

        let result = TemplateRenderer::new().render("{{ip}} {{username}}", &context);
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_template_fails() {
        let event = sample_event();
        let server = server();
        let context = TemplateContext::new(&server, &event);

        assert!(TemplateRenderer::new().render("{{#if ip}}open", &context).is_err());
    }

    #[test]
    fn test_metadata_carries_event_fields() {
        let event = sample_event();
        let server = server();
        let metadata = TemplateContext::new(&server, &event).to_metadata();

        assert_eq!(metadata["ip"], "203.0.113.5");
        assert_eq!(metadata["event_type"], "ban");
        assert_eq!(metadata["server"]["name"], "edge-1");
    }
}
