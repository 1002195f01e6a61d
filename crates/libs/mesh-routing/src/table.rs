use std::collections::HashMap;
use std::time::Instant;

use mesh_codec::Instance;

use crate::device::Device;
use crate::events::RoutingEvent;
use crate::link::{Link, INTERNET_UNREACHABLE};

/// Protocol-level TTL. Updates advertising `hop_count >= MAX_HOP_COUNT` are
/// rejected outright (split-horizon policy).
pub const MAX_HOP_COUNT: u8 = 3;

#[derive(Default)]
struct Entry {
    links: Vec<Link>,
}

/// Device -> {links reachable via that device}, with best-path selection and
/// found/lost event bookkeeping.
///
/// Single-writer: callers are expected to serialize mutation with their own
/// mutex (see the crate docs) — this type itself does no locking.
#[derive(Default)]
pub struct RoutingTable {
    entries: HashMap<Device, Entry>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: installs an empty entry for `device` if none exists yet.
    pub fn register(&mut self, device: Device) {
        self.entries.entry(device).or_default();
    }

    /// Every device with a direct, registered link (i.e. every key of the
    /// table), regardless of what instances are reachable through it.
    pub fn registered_devices(&self) -> Vec<Device> {
        self.entries.keys().cloned().collect()
    }

    /// Removes every link reachable via `device`. Emits `InstanceLost` for
    /// every instance that had no remaining path afterward.
    pub fn unregister(&mut self, device: &Device) -> Vec<RoutingEvent> {
        let Some(entry) = self.entries.remove(device) else {
            return Vec::new();
        };
        log::debug!("dropping {} link(s) via {device:?}", entry.links.len());

        let mut affected: Vec<Instance> = entry
            .links
            .iter()
            .map(|l| l.destination_instance)
            .collect();
        affected.sort_by_key(|i| *i.as_bytes());
        affected.dedup();

        let mut events = Vec::new();
        for instance in affected {
            match self.best_link(&instance, None) {
                None => events.push(RoutingEvent::InstanceLost(instance)),
                Some(new_best) => events.push(RoutingEvent::LinkUpdate(new_best)),
            }
        }
        events
    }

    /// Installs or refreshes the link `device -> instance`. Rejects updates
    /// at or beyond `MAX_HOP_COUNT` without installing anything.
    pub fn register_or_update(
        &mut self,
        device: Device,
        instance: Instance,
        hop_count: u8,
        internet_hop_count: u8,
    ) -> Vec<RoutingEvent> {
        if hop_count >= MAX_HOP_COUNT {
            log::debug!(
                "rejecting update for {instance:?} via {device:?}: hop_count {hop_count} >= {MAX_HOP_COUNT}"
            );
            return Vec::new();
        }

        let prior_best = self.best_link(&instance, None);

        let entry = self.entries.entry(device.clone()).or_default();
        entry
            .links
            .retain(|l| l.destination_instance != instance);
        entry.links.push(Link {
            next_hop_device: device,
            destination_instance: instance,
            hop_count,
            internet_hop_count,
            created_at: Instant::now(),
        });

        let new_best = self.best_link(&instance, None);

        let mut events = Vec::new();
        if prior_best.is_none() {
            events.push(RoutingEvent::InstanceFound(instance));
        }
        let best_changed = match (&prior_best, &new_best) {
            (None, Some(_)) => true,
            (Some(old), Some(new)) => old.path_rank() != new.path_rank() || old.next_hop_device != new.next_hop_device,
            _ => false,
        };
        if best_changed {
            if let Some(best) = new_best {
                events.push(RoutingEvent::LinkUpdate(best));
            }
        }
        events
    }

    /// Best path to `instance`, excluding any link whose next hop is
    /// `split_horizon`.
    pub fn best_link(&self, instance: &Instance, split_horizon: Option<&Device>) -> Option<Link> {
        self.entries
            .iter()
            .filter(|&(device, _)| Some(device) != split_horizon)
            .flat_map(|(_, entry)| entry.links.iter())
            .filter(|link| &link.destination_instance == instance)
            .min_by_key(|link| link.path_rank())
            .cloned()
    }

    /// Best path toward any Internet-capable peer, excluding `split_horizon`.
    pub fn best_internet_link(&self, split_horizon: Option<&Device>) -> Option<Link> {
        self.entries
            .iter()
            .filter(|&(device, _)| Some(device) != split_horizon)
            .flat_map(|(_, entry)| entry.links.iter())
            .filter(|link| link.internet_hop_count < INTERNET_UNREACHABLE)
            .min_by_key(|link| link.internet_rank())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(b: u8) -> Instance {
        Instance::new([b; 16])
    }

    #[test]
    fn register_or_update_rejects_hop_count_at_max() {
        let mut table = RoutingTable::new();
        let events = table.register_or_update(Device::new("d1"), instance(1), MAX_HOP_COUNT, 0);
        assert!(events.is_empty());
        assert!(table.best_link(&instance(1), None).is_none());
    }

    #[test]
    fn register_or_update_emits_found_then_update_on_first_install() {
        let mut table = RoutingTable::new();
        let events =
            table.register_or_update(Device::new("d1"), instance(1), 1, INTERNET_UNREACHABLE);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], RoutingEvent::InstanceFound(i) if i == instance(1)));
        assert!(matches!(&events[1], RoutingEvent::LinkUpdate(l) if l.next_hop_device == Device::new("d1")));
    }

    #[test]
    fn best_link_prefers_lower_hop_count() {
        let mut table = RoutingTable::new();
        table.register_or_update(Device::new("near"), instance(1), 1, INTERNET_UNREACHABLE);
        table.register_or_update(Device::new("far"), instance(1), 2, INTERNET_UNREACHABLE);
        let best = table.best_link(&instance(1), None).unwrap();
        assert_eq!(best.next_hop_device, Device::new("near"));
    }

    #[test]
    fn best_link_ties_broken_by_older_link() {
        let mut table = RoutingTable::new();
        table.register_or_update(Device::new("first"), instance(1), 1, INTERNET_UNREACHABLE);
        // Installed slightly later, same hop count: first link is more stable.
        table.register_or_update(Device::new("second"), instance(1), 1, INTERNET_UNREACHABLE);
        let best = table.best_link(&instance(1), None).unwrap();
        assert_eq!(best.next_hop_device, Device::new("first"));
    }

    #[test]
    fn split_horizon_excludes_previous_hop() {
        let mut table = RoutingTable::new();
        table.register_or_update(Device::new("via-b"), instance(1), 1, INTERNET_UNREACHABLE);
        let excluded = Device::new("via-b");
        assert!(table.best_link(&instance(1), Some(&excluded)).is_none());
    }

    #[test]
    fn unregister_with_sole_path_emits_instance_lost() {
        let mut table = RoutingTable::new();
        table.register_or_update(Device::new("d1"), instance(1), 1, INTERNET_UNREACHABLE);
        let events = table.unregister(&Device::new("d1"));
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], RoutingEvent::InstanceLost(i) if i == instance(1)));
    }

    #[test]
    fn unregister_with_alternate_path_emits_only_link_update() {
        let mut table = RoutingTable::new();
        table.register_or_update(Device::new("primary"), instance(1), 1, INTERNET_UNREACHABLE);
        table.register_or_update(Device::new("backup"), instance(1), 2, INTERNET_UNREACHABLE);
        let events = table.unregister(&Device::new("primary"));
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], RoutingEvent::LinkUpdate(l) if l.next_hop_device == Device::new("backup")));
    }

    #[test]
    fn register_or_update_is_exactly_once_per_device_instance() {
        let mut table = RoutingTable::new();
        let mut found_count = 0;
        let mut lost_count = 0;
        for hop in [1u8, 2, 1, 1] {
            for ev in table.register_or_update(Device::new("d1"), instance(1), hop, INTERNET_UNREACHABLE) {
                if matches!(ev, RoutingEvent::InstanceFound(_)) {
                    found_count += 1;
                }
            }
        }
        for ev in table.unregister(&Device::new("d1")) {
            if matches!(ev, RoutingEvent::InstanceLost(_)) {
                lost_count += 1;
            }
        }
        assert_eq!(found_count, 1);
        assert_eq!(lost_count, 1);
    }

    #[test]
    fn best_internet_link_minimizes_internet_hop_count() {
        let mut table = RoutingTable::new();
        table.register_or_update(Device::new("gw1"), instance(1), 1, 2);
        table.register_or_update(Device::new("gw2"), instance(2), 1, 1);
        let best = table.best_internet_link(None).unwrap();
        assert_eq!(best.next_hop_device, Device::new("gw2"));
    }
}
