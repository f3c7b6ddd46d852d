//! HTML and CSV renderers for the public pages.
//!
//! HTML output is a plain table page with a small navigation bar; CSV rows
//! carry no header line. Station names are user supplied and always escaped.

use std::fmt::Write;

use axum::{
    http::header,
    response::{IntoResponse, Response},
};

use super::params::Format;
use crate::{DataPoint, Lightning, RegisteredStation, Station};

// ---

/// Seconds between two reloads of the live overview page.
pub const REFRESH_SECONDS: u32 = 5;

/// Build the response for `format`, rendering only the body that is needed.
pub fn respond(
    format: Format,
    html: impl FnOnce() -> String,
    text: impl FnOnce() -> String,
) -> Response {
    // ---
    let (content_type, body) = match format {
        Format::Html => ("text/html; charset=utf-8", html()),
        Format::Csv => ("text/csv; charset=utf-8", text()),
        Format::Plain => ("text/plain; charset=utf-8", text()),
    };
    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}

pub fn escape_html(s: &str) -> String {
    // ---
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Quote a CSV field when it would otherwise break the row.
fn csv_field(s: &str) -> String {
    // ---
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Wrap `body` into a complete page.
pub fn page(title: &str, refresh: Option<u32>, body: &str) -> String {
    // ---
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    if let Some(seconds) = refresh {
        let _ = writeln!(html, "<meta http-equiv=\"refresh\" content=\"{}\">", seconds);
    }
    let _ = writeln!(html, "<title>meteod - {}</title>", escape_html(title));
    html.push_str("</head>\n<body>\n");
    html.push_str(
        "<p><a href=\"/\">Current</a> | <a href=\"/nodes\">Stations</a> | \
         <a href=\"/lightnings\">Lightnings</a></p>\n",
    );
    let _ = writeln!(html, "<h1>{}</h1>", escape_html(title));
    html.push_str(body);
    html.push_str("</body>\n</html>\n");
    html
}

fn table(headers: &[&str], rows: impl Iterator<Item = Vec<String>>) -> String {
    // ---
    let mut html = String::from("<table border=\"1\">\n<tr>");
    for h in headers {
        let _ = write!(html, "<th>{}</th>", h);
    }
    html.push_str("</tr>\n");
    for row in rows {
        html.push_str("<tr>");
        for cell in row {
            let _ = write!(html, "<td>{}</td>", cell);
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</table>\n");
    html
}

fn station_link(id: i64) -> String {
    format!("<a href=\"/node?id={id}\">{id}</a>")
}

// --- live overview

pub fn stations_table(stations: &[Station]) -> String {
    // ---
    if stations.is_empty() {
        return "<p>No active stations.</p>\n".to_string();
    }
    table(
        &["Station", "Name", "Temperature [C]", "Humidity [%]", "Pressure [hPa]", "Light (IR/Vis)"],
        stations.iter().map(|s| {
            vec![
                station_link(s.id),
                escape_html(&s.name),
                format!("{:.2}", s.temperature),
                format!("{:.2}", s.humidity),
                format!("{:.2}", s.pressure),
                format!("{:.2}/{:.2}", s.light_ir, s.light_vis),
            ]
        }),
    )
}

/// `id,name,temperature,humidity,pressure,light_ir/light_vis`
pub fn stations_csv(stations: &[Station]) -> String {
    // ---
    let mut out = String::new();
    for s in stations {
        let _ = writeln!(
            out,
            "{},{},{},{},{},{}/{}",
            s.id,
            csv_field(&s.name),
            s.temperature,
            s.humidity,
            s.pressure,
            s.light_ir,
            s.light_vis
        );
    }
    out
}

// --- station history

pub fn datapoints_table(points: &[DataPoint]) -> String {
    // ---
    if points.is_empty() {
        return "<p>No data points.</p>\n".to_string();
    }
    table(
        &["Timestamp", "Temperature [C]", "Humidity [%]", "Pressure [hPa]", "Light (IR/Vis)"],
        points.iter().map(|p| {
            vec![
                p.timestamp.to_string(),
                format!("{:.2}", p.temperature),
                format!("{:.2}", p.humidity),
                format!("{:.2}", p.pressure),
                format!("{:.2}/{:.2}", p.light_ir, p.light_vis),
            ]
        }),
    )
}

/// `timestamp,temperature,humidity,pressure,light_ir/light_vis`
pub fn datapoints_csv(points: &[DataPoint]) -> String {
    // ---
    let mut out = String::new();
    for p in points {
        let _ = writeln!(
            out,
            "{},{},{},{},{}/{}",
            p.timestamp, p.temperature, p.humidity, p.pressure, p.light_ir, p.light_vis
        );
    }
    out
}

// --- lightnings

pub fn lightnings_table(events: &[Lightning]) -> String {
    // ---
    if events.is_empty() {
        return "<p>No lightnings recorded.</p>\n".to_string();
    }
    table(
        &["Timestamp", "Station", "Distance [km]"],
        events.iter().map(|l| {
            vec![
                l.timestamp.to_string(),
                station_link(l.station),
                format!("{:.1}", l.distance),
            ]
        }),
    )
}

/// `timestamp,station,distance`
pub fn lightnings_csv(events: &[Lightning]) -> String {
    // ---
    let mut out = String::new();
    for l in events {
        let _ = writeln!(out, "{},{},{}", l.timestamp, l.station, l.distance);
    }
    out
}

// --- registry

pub fn directory_table(registry: &[RegisteredStation], active: &[i64]) -> String {
    // ---
    if registry.is_empty() {
        return "<p>No stations registered.</p>\n".to_string();
    }
    table(
        &["Station", "Name", "Description", "Active"],
        registry.iter().map(|r| {
            vec![
                station_link(r.id),
                escape_html(&r.name),
                escape_html(&r.description),
                if active.contains(&r.id) { "yes" } else { "no" }.to_string(),
            ]
        }),
    )
}

/// `id,name`
pub fn directory_csv(registry: &[RegisteredStation]) -> String {
    // ---
    let mut out = String::new();
    for r in registry {
        let _ = writeln!(out, "{},{}", r.id, csv_field(&r.name));
    }
    out
}
