//! Operator-facing output.
//!
//! Everything the operator reads goes through [`DisplaySink`]; diagnostics go
//! to the logger instead.

use std::io::{self, Write};

use crate::app_context::Actuator;

/// Destination for inbound messages and operator feedback.
pub trait DisplaySink: Send + Sync {
    /// Shows an inbound `(topic, payload)` pair exactly as received.
    fn message(&self, topic: &str, payload: &str);

    /// Shows a line of operator feedback.
    fn notice(&self, text: &str);

    /// Shows the input prompt.
    fn prompt(&self) {}
}

/// Writes to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleDisplay;

impl DisplaySink for ConsoleDisplay {
    fn message(&self, topic: &str, payload: &str) {
        println!("   < {topic}: {payload}");
    }

    fn notice(&self, text: &str) {
        println!("{text}");
    }

    fn prompt(&self) {
        print!(">>> ");
        let _ = io::stdout().flush();
    }
}

/// Lines of the manual-override menu.
pub fn render_menu(actuators: &[Actuator]) -> Vec<String> {
    let mut lines = vec![String::new(), "Available actuators (manual override):".to_string()];

    if actuators.is_empty() {
        lines.push("   (none declared)".to_string());
    }

    lines.extend(actuators.iter().enumerate().map(|(idx, act)| {
        format!(
            "   [{idx}] {} ({}) -> {}",
            act.name,
            act.mode.value_range().unwrap_or("?"),
            act.topic
        )
    }));

    lines.extend([
        String::new(),
        "Commands:".to_string(),
        "   <index> <value>  - Send value to actuator (e.g. '0 1')".to_string(),
        "   q                - Quit".to_string(),
        String::new(),
        "   Manual values persist and are re-published before the device watchdog expires"
            .to_string(),
        String::new(),
    ]);

    lines
}
