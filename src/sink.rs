//! Reporting sinks for unrecognized scans
//!
//! Classification only produces `UnrecognizedDescriptor` events; a sink
//! decides how an operator sees them.

use crate::types::UnrecognizedDescriptor;

/// Receives scans that need manual triage
pub trait ReportSink {
    fn report(&mut self, event: &UnrecognizedDescriptor);
}

/// Logs each event at warn level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn report(&mut self, event: &UnrecognizedDescriptor) {
        tracing::warn!(
            series_id = %event.series_id,
            protocol = %event.protocol_name,
            dcm_dir = %event.dcm_dir_name,
            reason = event.reason.as_str(),
            "series not recognized"
        );
    }
}

/// Keeps events in memory
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    pub events: Vec<UnrecognizedDescriptor>,
}

impl ReportSink for CollectingSink {
    fn report(&mut self, event: &UnrecognizedDescriptor) {
        self.events.push(event.clone());
    }
}

impl<S: ReportSink + ?Sized> ReportSink for &mut S {
    fn report(&mut self, event: &UnrecognizedDescriptor) {
        (**self).report(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ScanDescriptor, UnrecognizedReason};
    use pretty_assertions::assert_eq;

    fn event(series_id: &str) -> UnrecognizedDescriptor {
        let descriptor = ScanDescriptor::new(series_id, "localizer").with_dcm_dir("1-localizer");
        UnrecognizedDescriptor::from_descriptor(&descriptor, UnrecognizedReason::NoRuleMatched)
    }

    fn report_all<S: ReportSink>(mut sink: S, events: &[UnrecognizedDescriptor]) {
        for e in events {
            sink.report(e);
        }
    }

    #[test]
    fn test_collecting_sink_keeps_order() {
        let mut sink = CollectingSink::default();
        sink.report(&event("2"));
        sink.report(&event("1"));

        let ids: Vec<&str> = sink.events.iter().map(|e| e.series_id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1"]);
        assert_eq!(sink.events[0].dcm_dir_name, "1-localizer");
    }

    #[test]
    fn test_mut_reference_forwards_to_sink() {
        let mut sink = CollectingSink::default();
        report_all(&mut sink, &[event("3"), event("4")]);
        report_all(&mut sink, &[event("5")]);

        assert_eq!(sink.events.len(), 3);
        assert_eq!(sink.events[2].series_id, "5");
    }

    #[test]
    fn test_tracing_sink_accepts_events() {
        let mut sink = TracingSink;
        sink.report(&event("6"));
        report_all(&mut sink, &[event("7")]);
    }
}
