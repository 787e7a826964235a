//! ConnectOverlay — derive connect-topic events from service health
//! events.
//!
//! Connect subscribers only care about instances that participate in the
//! mesh, and they watch proxies under the *destination* service name
//! rather than the proxy's own. This is a pure function; the projector
//! runs it once over its full batch as a final pass.

use roster_state::ServiceKind;

use crate::event::{Event, Topic};

/// The connect-topic events implied by `events`.
///
/// Skips anything not on `ServiceHealth` (including its own output, so
/// applying the overlay twice appends nothing) and anything whose
/// instance is not connect-enabled. The operation is preserved:
/// deregistrations of connect-enabled instances deregister on the
/// connect topic too.
pub fn connect_events(events: &[Event]) -> Vec<Event> {
    let mut out = Vec::new();
    for event in events {
        if event.topic != Topic::ServiceHealth {
            continue;
        }
        let Some(update) = event.payload.service_health() else {
            continue;
        };
        let sn = &update.check_service_node.service;
        if !sn.connect_enabled() {
            continue;
        }

        let mut connect = event.clone();
        connect.topic = Topic::ServiceHealthConnect;
        // Proxies are indexed under the service they stand in for.
        if sn.kind == ServiceKind::ConnectProxy {
            connect.key = sn.proxy.destination_service.clone();
        }
        out.push(connect);
    }
    out
}
