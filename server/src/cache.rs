use bytes::Bytes;
use log::{debug, warn};
use shared::{encode_server_list, ServerListType, SLT_END};

use crate::store::ServerStore;

/// Last serialized list for one category.
#[derive(Debug, Clone, Default)]
struct CacheLine {
    packet: Option<Bytes>,
    dirty: bool,
    next_rebuild_frame: u64,
}

/// Lazily rebuilt MASTER_RESPONSE_LIST packets, one line per category.
///
/// A line is served as-is while it is clean and younger than the list age.
/// Lines are only ever replaced whole, so a packet handed out earlier is
/// never modified behind the receiver's back.
#[derive(Debug)]
pub struct ServerListCache {
    lines: [CacheLine; SLT_END],
    list_age: u64,
    safe_mtu: usize,
}

impl ServerListCache {
    pub fn new(list_age: u64, safe_mtu: usize) -> Self {
        let empty = CacheLine {
            dirty: true,
            ..CacheLine::default()
        };
        Self {
            lines: [empty.clone(), empty],
            list_age,
            safe_mtu,
        }
    }

    /// Marks every category for rebuild. Called on any online/offline change.
    pub fn invalidate_all(&mut self) {
        for line in self.lines.iter_mut() {
            line.dirty = true;
        }
    }

    pub fn is_dirty(&self, category: ServerListType) -> bool {
        self.lines[Self::line_for(category).1].dirty
    }

    /// `Autodetect` has no line of its own and is served the IPv4 list,
    /// the same as a request without a selector.
    fn line_for(category: ServerListType) -> (ServerListType, usize) {
        match category.index() {
            Some(slot) => (category, slot),
            None => (ServerListType::Ipv4, 0),
        }
    }

    /// Returns the list packet for `category`, rebuilding it from `store`
    /// when the line is dirty or has reached `next_rebuild_frame`.
    pub fn get(&mut self, category: ServerListType, frame: u64, store: &dyn ServerStore) -> Bytes {
        let (category, slot) = Self::line_for(category);
        let line = &self.lines[slot];

        if let Some(packet) = &line.packet {
            if !line.dirty && frame < line.next_rebuild_frame {
                return packet.clone();
            }
        }

        match store.list_online_servers(category) {
            Ok(servers) => {
                let (packet, written) = encode_server_list(category, &servers, self.safe_mtu);
                if written < servers.len() {
                    debug!(
                        "{:?} server list truncated to {} of {} servers to fit {} bytes",
                        category,
                        written,
                        servers.len(),
                        self.safe_mtu
                    );
                }
                debug!(
                    "Rebuilt {:?} server list at frame {} ({} servers, {} bytes)",
                    category,
                    frame,
                    written,
                    packet.len()
                );

                self.lines[slot] = CacheLine {
                    packet: Some(packet.clone()),
                    dirty: false,
                    next_rebuild_frame: frame + self.list_age,
                };
                packet
            }
            Err(e) => {
                warn!("Failed to list online servers for {:?}: {}", category, e);
                line.packet
                    .clone()
                    .unwrap_or_else(|| encode_server_list(category, &[], self.safe_mtu).0)
            }
        }
    }
}
