//! Pluggable vehicle reasoning
//!
//! The engine asks a [`ReasoningProvider`] to explain a vehicle's behaviour
//! from its snapshot and memory log. [`RuleBasedReasoner`] is the offline
//! default; `LlmReasoner` swaps in a hosted model without touching the
//! engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::fleet::memory::MemoryEvent;
use crate::fleet::vehicle::VehicleSnapshot;

/// Memory window read by the basic rules
pub const BASIC_WINDOW: usize = 5;
/// Memory window read by the advanced and narrative rules
pub const ADVANCED_WINDOW: usize = 20;

#[async_trait]
pub trait ReasoningProvider: Send + Sync {
    /// Explain the vehicle's recent behaviour; `memory` is oldest first
    async fn produce_reasoning(&self, vehicle: &VehicleSnapshot, memory: &[MemoryEvent]) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningStyle {
    /// Last few events, one short line
    Basic,
    /// Wider window with reroute and delivery-rate heuristics
    #[default]
    Advanced,
    /// Longer operator-style status lines
    Narrative,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedReasoner {
    style: ReasoningStyle,
}

impl RuleBasedReasoner {
    pub fn new(style: ReasoningStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> ReasoningStyle {
        self.style
    }

    pub fn reason(&self, memory: &[MemoryEvent]) -> String {
        match self.style {
            ReasoningStyle::Basic => basic(memory),
            ReasoningStyle::Advanced => advanced(memory),
            ReasoningStyle::Narrative => narrative(memory),
        }
    }
}

#[async_trait]
impl ReasoningProvider for RuleBasedReasoner {
    async fn produce_reasoning(&self, _vehicle: &VehicleSnapshot, memory: &[MemoryEvent]) -> Result<String> {
        Ok(self.reason(memory))
    }
}

fn window(memory: &[MemoryEvent], size: usize) -> &[MemoryEvent] {
    &memory[memory.len().saturating_sub(size)..]
}

fn basic(memory: &[MemoryEvent]) -> String {
    let recent = window(memory, BASIC_WINDOW);
    if recent.iter().any(MemoryEvent::is_reroute) {
        "Avoided traffic recently; will try to tighten the next route.".into()
    } else if recent.iter().any(MemoryEvent::is_delivery) {
        "Focused on deliveries while watching for traffic.".into()
    } else {
        "No recent events.".into()
    }
}

fn advanced(memory: &[MemoryEvent]) -> String {
    let recent = window(memory, ADVANCED_WINDOW);
    let reroutes = recent.iter().filter(|e| e.is_reroute()).count();
    let deliveries = recent.iter().filter(|e| e.is_delivery()).count();

    if reroutes > 2 {
        "Learning: steering clear of recurring traffic and sharing it with the fleet.".into()
    } else if deliveries > 5 {
        "High delivery rate; optimizing future assignments.".into()
    } else if recent.iter().any(MemoryEvent::is_assignment) {
        "Recently assigned new orders; monitoring route efficiency.".into()
    } else {
        basic(memory)
    }
}

fn narrative(memory: &[MemoryEvent]) -> String {
    let recent = window(memory, ADVANCED_WINDOW);
    if recent.iter().any(MemoryEvent::is_reroute) {
        "Adaptive rerouting engaged: detected a traffic anomaly and navigated around it. \
         Updating fleet models."
            .into()
    } else if recent.iter().any(MemoryEvent::is_delivery) {
        "Delivery complete. Choosing the next assignment or a return to depot \
         based on current fleet load."
            .into()
    } else if recent.iter().any(MemoryEvent::is_assignment) {
        "New task received. Planning a path that keeps projected time in traffic low.".into()
    } else {
        "Idle: awaiting a new assignment at the depot.".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{OrderId, Vec2, VehicleId};
    use crate::fleet::memory::MemoryKind;

    fn event(tick: u64, kind: MemoryKind) -> MemoryEvent {
        MemoryEvent::new(VehicleId(0), tick, tick as f64, kind)
    }

    fn reroute(tick: u64) -> MemoryEvent {
        event(tick, MemoryKind::Rerouted { at: Vec2::default() })
    }

    fn delivered(tick: u64) -> MemoryEvent {
        event(
            tick,
            MemoryKind::Delivered {
                order: OrderId(tick as u32),
                miles: 2.0,
            },
        )
    }

    fn assigned(tick: u64) -> MemoryEvent {
        event(
            tick,
            MemoryKind::Assigned {
                order: OrderId(tick as u32),
                destination: Vec2::default(),
            },
        )
    }

    #[test]
    fn test_basic_looks_at_last_five() {
        let reasoner = RuleBasedReasoner::new(ReasoningStyle::Basic);
        assert_eq!(reasoner.reason(&[]), "No recent events.");

        let mut memory = vec![reroute(0)];
        memory.extend((1..=5).map(delivered));
        assert!(reasoner.reason(&memory).starts_with("Focused on deliveries"));

        memory.push(reroute(6));
        assert!(reasoner.reason(&memory).starts_with("Avoided traffic"));
    }

    #[test]
    fn test_advanced_precedence() {
        let reasoner = RuleBasedReasoner::default();
        assert_eq!(reasoner.style(), ReasoningStyle::Advanced);

        let frequent: Vec<_> = (0..3).map(reroute).collect();
        assert!(reasoner.reason(&frequent).starts_with("Learning"));

        let busy: Vec<_> = (0..6).map(delivered).collect();
        assert!(reasoner.reason(&busy).starts_with("High delivery rate"));

        let fresh = vec![assigned(0), reroute(1)];
        assert!(reasoner.reason(&fresh).starts_with("Recently assigned"));

        assert_eq!(reasoner.reason(&[]), "No recent events.");
    }

    #[test]
    fn test_narrative_idle() {
        let reasoner = RuleBasedReasoner::new(ReasoningStyle::Narrative);
        assert!(reasoner.reason(&[]).starts_with("Idle"));
        assert!(reasoner.reason(&[assigned(0)]).starts_with("New task"));
    }

    #[tokio::test]
    async fn test_provider_ignores_snapshot() {
        let reasoner = RuleBasedReasoner::new(ReasoningStyle::Basic);
        let snapshot = crate::fleet::vehicle::Vehicle::new(VehicleId(0), Vec2::default()).snapshot();
        let text = reasoner.produce_reasoning(&snapshot, &[delivered(1)]).await.unwrap();
        assert!(text.starts_with("Focused on deliveries"));
    }
}
