//! Bridge hierarchy reconstruction
//!
//! sysfs gives no parent pointers. A device's parent is the bridge in the same
//! domain whose `[secondary, subordinate]` range most tightly encloses the
//! device's bus number. Ties on width go to the lower secondary bus; a tie on
//! both is malformed input, reported with `error!` and resolved to the
//! lowest address.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::device::{BridgeInfo, DeviceMap, PciDevice};

/// Per-domain root lists of a built hierarchy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Topology {
    roots: BTreeMap<u16, Vec<String>>,
}

impl Topology {
    pub fn domains(&self) -> impl Iterator<Item = u16> + '_ {
        self.roots.keys().copied()
    }

    /// Parentless devices of `domain`, sorted by address.
    pub fn roots(&self, domain: u16) -> &[String] {
        self.roots.get(&domain).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Depth-first walk of every domain forest. The visitor receives the
    /// device and, per level from the root down, whether the node on the path
    /// is the last of its siblings.
    pub fn walk<F>(&self, devices: &DeviceMap, mut visit: F)
    where
        F: FnMut(&PciDevice, &[bool]),
    {
        let mut seen = HashSet::new();
        let mut path = Vec::new();
        for roots in self.roots.values() {
            walk_siblings(devices, roots, &mut path, &mut seen, &mut visit);
        }
    }
}

fn walk_siblings<'a, F>(
    devices: &'a DeviceMap,
    siblings: &'a [String],
    path: &mut Vec<bool>,
    seen: &mut HashSet<&'a str>,
    visit: &mut F,
) where
    F: FnMut(&PciDevice, &[bool]),
{
    for (i, address) in siblings.iter().enumerate() {
        let device = match devices.get(address) {
            Some(device) => device,
            None => continue,
        };
        if !seen.insert(address.as_str()) {
            continue;
        }
        path.push(i + 1 == siblings.len());
        visit(device, path.as_slice());
        walk_siblings(devices, &device.children, path, seen, visit);
        path.pop();
    }
}

/// Candidate ranking: narrowest range first, then lowest secondary bus.
fn rank(info: &BridgeInfo) -> (u8, u8) {
    (info.width(), info.secondary)
}

/// Pick the parent bridge for `device`, if any.
fn nearest_bridge<'a>(
    device: &PciDevice,
    bridges: &[(&'a str, u16, BridgeInfo)],
) -> Option<&'a str> {
    let mut best: Option<(&'a str, (u8, u8))> = None;
    let mut tied: Vec<&'a str> = Vec::new();

    for &(address, domain, info) in bridges {
        if domain != device.domain || address == device.address || !info.forwards(device.bus) {
            continue;
        }
        let key = rank(&info);
        match best {
            Some((_, best_key)) if key > best_key => {}
            Some((_, best_key)) if key == best_key => tied.push(address),
            _ => {
                best = Some((address, key));
                tied.clear();
            }
        }
    }

    let (chosen, _) = best?;
    if !tied.is_empty() {
        log::error!(
            "{}: ambiguous topology, bridges {} and {} have identical bus ranges; choosing {}",
            device.address,
            chosen,
            tied.join(", "),
            chosen
        );
    }
    Some(chosen)
}

/// Break parent cycles, which only malformed bus ranges produce. Each cycle
/// loses the parent link of its lowest address.
fn break_cycles(parents: &mut BTreeMap<String, String>) {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        OnPath,
        Done,
    }

    let mut marks: HashMap<String, Mark> = HashMap::new();
    let mut detach = Vec::new();

    for start in parents.keys() {
        let mut path: Vec<&String> = Vec::new();
        let mut node = Some(start);
        while let Some(current) = node {
            match marks.get(current) {
                Some(Mark::Done) => break,
                Some(Mark::OnPath) => {
                    if let Some(pos) = path.iter().position(|p| *p == current) {
                        if let Some(lowest) = path[pos..].iter().min() {
                            detach.push((*lowest).clone());
                            log::error!(
                                "parent cycle through {}; detaching {}",
                                path[pos..].iter().map(|s| s.as_str()).collect::<Vec<_>>().join(" -> "),
                                lowest
                            );
                        }
                    }
                    break;
                }
                None => {
                    marks.insert(current.clone(), Mark::OnPath);
                    path.push(current);
                    node = parents.get(current);
                }
            }
        }
        for p in path {
            marks.insert(p.clone(), Mark::Done);
        }
    }

    for address in detach {
        parents.remove(&address);
    }
}

/// Derive parent/children for every device from scratch and return the
/// per-domain roots.
pub fn build_tree(devices: &mut DeviceMap) -> Topology {
    for device in devices.values_mut() {
        device.parent = None;
        device.children.clear();
    }

    let mut parents: BTreeMap<String, String> = BTreeMap::new();
    {
        let bridges: Vec<(&str, u16, BridgeInfo)> = devices
            .values()
            .filter_map(|d| d.bridge().map(|info| (d.address.as_str(), d.domain, *info)))
            .collect();

        for device in devices.values() {
            if let Some(parent) = nearest_bridge(device, &bridges) {
                parents.insert(device.address.clone(), parent.to_string());
            }
        }
    }

    break_cycles(&mut parents);

    // map order keeps each children list sorted by address
    for (child, parent) in &parents {
        if let Some(p) = devices.get_mut(parent) {
            p.children.push(child.clone());
        }
        if let Some(c) = devices.get_mut(child) {
            c.parent = Some(parent.clone());
        }
    }

    let mut roots: BTreeMap<u16, Vec<String>> = BTreeMap::new();
    for device in devices.values().filter(|d| d.parent.is_none()) {
        roots
            .entry(device.domain)
            .or_default()
            .push(device.address.clone());
    }

    log::debug!(
        "built topology: {} devices, {} linked, {} domains",
        devices.len(),
        parents.len(),
        roots.len()
    );
    Topology { roots }
}

/// Parent chain of `address`, nearest first. Bounded by the map size.
pub fn ancestors(devices: &DeviceMap, address: &str) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = devices.get(address).and_then(|d| d.parent.clone());
    while let Some(parent) = current {
        if chain.len() > devices.len() {
            break;
        }
        current = devices.get(&parent).and_then(|d| d.parent.clone());
        chain.push(parent);
    }
    chain
}
