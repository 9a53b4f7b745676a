//! Presentation layer: turns a [`RenderState`] into visible output.
//!
//! Everything here is a pure function of its inputs. The controller owns the
//! state and hands it to a [`RenderTarget`] after every transition.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Local;
use maud::{html, Markup};
use shared::domain::epoch_seconds_to_utc;

use crate::state::{Controls, RenderState};

pub const UNKNOWN: &str = "Unknown";
pub const QR_UNAVAILABLE: &str = "QR code is not available. Please refresh to get a new QR code.";
pub const RETRY_LABEL: &str = "Try Again";

const PAIRING_STEPS: [&str; 4] = [
    "Open WhatsApp on your phone",
    "Go to Settings > WhatsApp Web/Desktop",
    "Tap \"Link a Device\"",
    "Point your phone camera at the QR code",
];

pub trait RenderTarget: Send + Sync {
    fn render(&self, state: &RenderState, controls: Controls);
}

/// Blocking operator notification used for failed actions.
pub trait Notifier: Send + Sync {
    fn alert(&self, message: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedView {
    pub header: String,
    pub content: String,
    pub controls: String,
}

pub fn display_phone(phone_number: Option<&str>) -> &str {
    phone_number
        .map(str::trim)
        .filter(|phone| !phone.is_empty())
        .unwrap_or(UNKNOWN)
}

/// Local wall-clock rendering of an epoch-seconds timestamp.
pub fn format_connection_time(connection_time: Option<f64>) -> String {
    connection_time
        .and_then(epoch_seconds_to_utc)
        .map(|utc| {
            utc.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// MIME type for a base64 image payload, sniffed from its leading bytes.
pub fn qr_image_mime(payload: &str) -> &'static str {
    let prefix: String = payload.trim().chars().take(16).collect();
    match STANDARD.decode(prefix) {
        Ok(bytes) if bytes.starts_with(b"\xFF\xD8\xFF") => "image/jpeg",
        Ok(bytes) if bytes.starts_with(b"GIF8") => "image/gif",
        _ => "image/png",
    }
}

pub fn render_html(state: &RenderState, controls: Controls) -> RenderedView {
    RenderedView {
        header: html_header(state).into_string(),
        content: html_content(state).into_string(),
        controls: html_controls(controls).into_string(),
    }
}

fn html_header(state: &RenderState) -> Markup {
    match state {
        RenderState::Loading => html! {
            i class="bi bi-hourglass-split" {} " Checking connection status..."
        },
        RenderState::Connected { .. } => html! {
            i class="bi bi-wifi text-success" {} " Connected to WhatsApp"
        },
        RenderState::Disconnected { .. } => html! {
            i class="bi bi-wifi-off text-danger" {} " Not Connected to WhatsApp"
        },
        RenderState::Error { .. } => html! {
            i class="bi bi-exclamation-triangle text-warning" {} " Error Checking Status"
        },
    }
}

fn html_content(state: &RenderState) -> Markup {
    match state {
        RenderState::Loading => html! {
            div class="spinner-border text-primary" role="status" {
                span class="visually-hidden" { "Loading..." }
            }
            p { "Fetching connection status..." }
        },
        RenderState::Connected {
            phone_number,
            connection_time,
            bridge_error,
        } => html! {
            div class="alert alert-success mb-4" {
                h4 { i class="bi bi-check-circle-fill" {} " WhatsApp is connected!" }
                p { "Your WhatsApp client is ready to send messages." }
            }
            div class="card bg-light text-dark mb-3" {
                div class="card-body" {
                    h5 class="card-title" { "Connection Details" }
                    p { strong { "Phone Number:" } " " (display_phone(phone_number.as_deref())) }
                    p { strong { "Connected Since:" } " " (format_connection_time(*connection_time)) }
                }
            }
            (bridge_error_note(bridge_error.as_deref()))
        },
        RenderState::Disconnected {
            qr_code_image,
            bridge_error,
            ..
        } => html! {
            div class="alert alert-danger mb-4" {
                h4 { i class="bi bi-x-circle-fill" {} " WhatsApp is not connected" }
                p { "Please scan the QR code below with your WhatsApp app to connect." }
            }
            @if let Some(image) = qr_code_image {
                div class="text-center mb-4" {
                    h4 { "Scan this QR code with WhatsApp" }
                    img src={ "data:" (qr_image_mime(image)) ";base64," (image.trim()) }
                        class="img-fluid border border-light p-2 bg-white"
                        style="max-width: 300px;"
                        alt="WhatsApp QR Code";
                }
            } @else {
                div class="alert alert-warning" {
                    i class="bi bi-exclamation-triangle-fill" {} " " (QR_UNAVAILABLE)
                }
            }
            div class="alert alert-info" {
                h5 { i class="bi bi-lightbulb-fill" {} " How to scan:" }
                ol class="mb-0" {
                    @for step in PAIRING_STEPS {
                        li { (step) }
                    }
                }
            }
            (bridge_error_note(bridge_error.as_deref()))
        },
        RenderState::Error { message } => html! {
            div class="alert alert-danger" {
                h4 { i class="bi bi-x-circle-fill" {} " Failed to fetch status" }
                p { "There was an error retrieving the WhatsApp connection status: " (message) }
                button class="btn btn-primary" type="button" data-action="refresh" { (RETRY_LABEL) }
            }
        },
    }
}

fn bridge_error_note(bridge_error: Option<&str>) -> Markup {
    html! {
        @if let Some(error) = bridge_error {
            div class="alert alert-secondary" {
                strong { "Last bridge error:" } " " (error)
            }
        }
    }
}

fn html_controls(controls: Controls) -> Markup {
    html! {
        div class="btn-group" role="group" {
            button class="btn btn-primary" type="button" data-action="refresh"
                disabled[!controls.refresh] { "Refresh Status" }
            button class="btn btn-success" type="button" data-action="simulate_connect"
                disabled[!controls.simulate_connect] { "Simulate Connect" }
            button class="btn btn-danger" type="button" data-action="simulate_disconnect"
                disabled[!controls.simulate_disconnect] { "Simulate Disconnect" }
        }
    }
}

pub fn render_text(state: &RenderState, controls: Controls) -> String {
    let mut lines: Vec<String> = Vec::new();
    match state {
        RenderState::Loading => {
            lines.push("[..] Checking connection status...".to_string());
            lines.push("Fetching connection status...".to_string());
        }
        RenderState::Connected {
            phone_number,
            connection_time,
            bridge_error,
        } => {
            lines.push("[OK] Connected to WhatsApp".to_string());
            lines.push("WhatsApp is connected! Your client is ready to send messages.".to_string());
            lines.push(format!(
                "  Phone Number:    {}",
                display_phone(phone_number.as_deref())
            ));
            lines.push(format!(
                "  Connected Since: {}",
                format_connection_time(*connection_time)
            ));
            push_bridge_error(&mut lines, bridge_error.as_deref());
        }
        RenderState::Disconnected {
            qr_code_image,
            qr_code,
            bridge_error,
        } => {
            lines.push("[!!] Not Connected to WhatsApp".to_string());
            lines.push("Please scan the QR code with your WhatsApp app to connect.".to_string());
            match qr_code_image {
                Some(image) => lines.push(format!(
                    "  QR code image available ({} base64 chars)",
                    image.trim().len()
                )),
                None => lines.push(format!("  Warning: {QR_UNAVAILABLE}")),
            }
            if let Some(link) = qr_code {
                lines.push(format!("  Pairing link: {link}"));
            }
            lines.push("How to scan:".to_string());
            for (index, step) in PAIRING_STEPS.iter().enumerate() {
                lines.push(format!("  {}. {step}", index + 1));
            }
            push_bridge_error(&mut lines, bridge_error.as_deref());
        }
        RenderState::Error { message } => {
            lines.push("[??] Error Checking Status".to_string());
            lines.push(format!(
                "There was an error retrieving the WhatsApp connection status: {message}"
            ));
            lines.push(format!("  [{RETRY_LABEL}] press r to refresh"));
        }
    }
    lines.push(text_controls(controls));
    lines.join("\n")
}

fn push_bridge_error(lines: &mut Vec<String>, bridge_error: Option<&str>) {
    if let Some(error) = bridge_error {
        lines.push(format!("  Last bridge error: {error}"));
    }
}

fn text_controls(controls: Controls) -> String {
    let label = |name: &str, enabled: bool| {
        if enabled {
            format!("[{name}]")
        } else {
            format!("({name}: busy)")
        }
    };
    format!(
        "Controls: {} {} {}",
        label("r refresh", controls.refresh),
        label("c connect", controls.simulate_connect),
        label("d disconnect", controls.simulate_disconnect),
    )
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
