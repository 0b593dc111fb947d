use std::collections::BTreeMap;

/// Ticket identifying one issued analysis call for an incident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlightTicket {
    incident_id: String,
    seq: u64,
}

impl FlightTicket {
    pub fn incident_id(&self) -> &str {
        &self.incident_id
    }
}

/// Per-incident single-flight tracker. Issuing a new call for an incident
/// supersedes any prior in-flight call for the same incident: the stale
/// completion settles to `false` and its effects must be discarded.
/// Synchronously appended messages are never part of a flight and are
/// unaffected by supersession.
#[derive(Debug, Default)]
pub struct AnalysisFlights {
    latest: BTreeMap<String, u64>,
    in_flight: BTreeMap<String, u64>,
}

impl AnalysisFlights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, incident_id: &str) -> FlightTicket {
        let seq = self
            .latest
            .entry(incident_id.to_string())
            .and_modify(|seq| *seq += 1)
            .or_insert(1);
        self.in_flight.insert(incident_id.to_string(), *seq);
        FlightTicket {
            incident_id: incident_id.to_string(),
            seq: *seq,
        }
    }

    /// Settles a completed flight. Returns `true` when the ticket is still
    /// the newest issued call for its incident; a superseded or already
    /// settled ticket returns `false` and leaves any newer flight in place.
    pub fn settle(&mut self, ticket: &FlightTicket) -> bool {
        if self.in_flight.get(&ticket.incident_id) != Some(&ticket.seq) {
            return false;
        }
        self.in_flight.remove(&ticket.incident_id);
        true
    }

    pub fn has_in_flight(&self, incident_id: &str) -> bool {
        self.in_flight.contains_key(incident_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_flights_settle_in_order() {
        let mut flights = AnalysisFlights::new();

        let first = flights.begin("inc-1");
        assert!(flights.has_in_flight("inc-1"));
        assert!(flights.settle(&first));
        assert!(!flights.has_in_flight("inc-1"));

        let second = flights.begin("inc-1");
        assert!(flights.settle(&second));
    }

    #[test]
    fn newer_flight_supersedes_the_older_one() {
        let mut flights = AnalysisFlights::new();

        let first = flights.begin("inc-1");
        let second = flights.begin("inc-1");

        assert!(!flights.settle(&first), "stale ticket must be discarded");
        assert!(flights.has_in_flight("inc-1"), "newest call still pending");
        assert!(flights.settle(&second));
        assert!(!flights.has_in_flight("inc-1"));
    }

    #[test]
    fn incidents_are_tracked_independently() {
        let mut flights = AnalysisFlights::new();

        let one = flights.begin("inc-1");
        let two = flights.begin("inc-2");

        assert!(flights.settle(&two));
        assert!(flights.has_in_flight("inc-1"));
        assert!(flights.settle(&one));
    }

    #[test]
    fn settle_is_single_shot_for_the_same_ticket() {
        let mut flights = AnalysisFlights::new();
        let ticket = flights.begin("inc-1");

        assert!(flights.settle(&ticket));
        assert!(!flights.settle(&ticket), "duplicate completion is ignored");
        assert!(!flights.has_in_flight("inc-1"));
    }
}
