use askama::Template;
use tracing::error;

use crate::widget::{RenderModel, WidgetState, WidgetView};

pub struct Failure<'a> {
    pub message: &'a str,
    pub location: &'a str,
}

#[derive(Template)]
#[template(path = "widget.html")]
pub struct WidgetTemplate<'a> {
    pub loading: Option<&'a str>,
    pub model: Option<&'a RenderModel>,
    pub failure: Option<Failure<'a>>,
    pub refresh_seconds: u64,
}

pub fn render_state(state: &WidgetState, refresh_seconds: u64) -> String {
    let template = match state {
        WidgetState::Loading { location } => WidgetTemplate {
            loading: Some(location.as_str()),
            model: None,
            failure: None,
            refresh_seconds,
        },
        WidgetState::Loaded(model) => WidgetTemplate {
            loading: None,
            model: Some(model),
            failure: None,
            refresh_seconds,
        },
        WidgetState::Failed { message, location } => WidgetTemplate {
            loading: None,
            model: None,
            failure: Some(Failure { message, location }),
            refresh_seconds,
        },
    };

    template.render().unwrap_or_else(|e| {
        error!("Template rendering error: {}", e);
        format!("Template error: {}", e)
    })
}

/// Keeps the markup for the most recent state.
pub struct HtmlView {
    refresh_seconds: u64,
    html: String,
}

impl HtmlView {
    pub fn new(refresh_seconds: u64) -> Self {
        Self {
            refresh_seconds,
            html: String::new(),
        }
    }

    pub fn into_html(self) -> String {
        self.html
    }
}

impl WidgetView for HtmlView {
    fn show(&mut self, state: &WidgetState) {
        self.html = render_state(state, self.refresh_seconds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Units;
    use crate::weather::testing::{current_json, forecast_json, JAN_1};
    use crate::weather::{parse_current, parse_forecast};
    use chrono::Utc;

    #[test]
    fn test_loaded_state_renders_header_details_and_days() {
        let current = parse_current(&current_json("Warsaw", 4.0)).unwrap();
        let forecast = parse_forecast(&forecast_json(JAN_1, 40)).unwrap();
        let model = RenderModel::build(&current, &forecast, Units::Metric, Utc::now());

        let html = render_state(&WidgetState::Loaded(model), 600);

        assert!(html.contains("Warsaw, PL"));
        assert!(html.contains("4°C"));
        assert!(html.contains("1013 hPa"));
        assert_eq!(html.matches("class=\"forecast-day\"").count(), 5);
        assert!(html.contains("content=\"600\""));
    }

    #[test]
    fn test_failed_state_escapes_message() {
        let state = WidgetState::Failed {
            message: "<b>boom".into(),
            location: "Paris".into(),
        };
        let mut view = HtmlView::new(0);
        view.show(&state);
        let html = view.into_html();

        assert!(html.contains("weather-error"));
        assert!(html.contains("&lt;b&gt;boom"));
        assert!(html.contains("Paris"));
        assert!(!html.contains("http-equiv=\"refresh\""));
    }

    #[test]
    fn test_loading_state() {
        let html = render_state(&WidgetState::Loading { location: "Oslo".into() }, 600);
        assert!(html.contains("weather-loading"));
    }
}
