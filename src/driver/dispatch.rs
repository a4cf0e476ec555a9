use super::detect::Reduction;
use crate::error::Result;
use crate::sink::{CapabilitySink, TriggerEvent};
use chrono::{DateTime, Utc};

/// Publish a reduction in capability order.
///
/// A capability that transitioned is written only after its trigger was
/// delivered, so a failed trigger leaves the old value published and the
/// next cycle detects the same change again. Returns the names of the
/// triggers fired.
pub async fn publish(
    sink: &dyn CapabilitySink,
    device_id: &str,
    reduction: &Reduction,
    now: DateTime<Utc>,
) -> Result<Vec<String>> {
    let mut fired = Vec::with_capacity(reduction.transitions.len());
    for (name, value) in &reduction.writes {
        if let Some(transition) = reduction.transitions.iter().find(|t| t.capability == *name) {
            let trigger = transition.trigger_name();
            sink.trigger(TriggerEvent {
                device_id: device_id.to_string(),
                name: trigger.clone(),
                tokens: serde_json::json!({
                    "capability": transition.capability,
                    "value": transition.value,
                }),
                fired_at: now,
            })
            .await?;
            fired.push(trigger);
        }
        sink.set_capability(name, value.clone()).await?;
    }
    Ok(fired)
}
