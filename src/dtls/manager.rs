use std::collections::BTreeMap;

use crate::config::Config;

use super::collector::AddOutcome;
use super::{DtlsHandshakeFragment, FragmentCollector};

/// Identifies one logical handshake message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FragmentKey {
    pub message_seq: u16,
    pub epoch: u16,
}

impl FragmentKey {
    pub fn new(message_seq: u16, epoch: u16) -> Self {
        FragmentKey { message_seq, epoch }
    }

    fn of(fragment: &DtlsHandshakeFragment) -> Self {
        FragmentKey::new(fragment.message_seq(), fragment.epoch)
    }
}

/// Collectors for every message currently being reassembled on one connection.
#[derive(Debug)]
pub struct FragmentManager {
    config: Config,
    collectors: BTreeMap<FragmentKey, FragmentCollector>,
}

impl FragmentManager {
    pub fn new(config: &Config) -> Self {
        FragmentManager {
            config: config.clone(),
            collectors: BTreeMap::new(),
        }
    }

    /// Route `fragment` to its collector, creating the collector on first sight.
    pub fn add_message_fragment(&mut self, fragment: &DtlsHandshakeFragment) -> AddOutcome {
        let key = FragmentKey::of(fragment);
        let config = &self.config;
        let collector = self
            .collectors
            .entry(key)
            .or_insert_with(|| FragmentCollector::new(config, fragment));

        let outcome = collector.try_add_fragment(fragment);
        trace!("Fragment {:?} offset {}: {:?}", key, fragment.fragment_offset(), outcome);
        outcome
    }

    pub fn collector(&self, message_seq: u16, epoch: u16) -> Option<&FragmentCollector> {
        self.collectors.get(&FragmentKey::new(message_seq, epoch))
    }

    pub fn is_fragmented_message_complete(&self, message_seq: u16, epoch: u16) -> bool {
        self.collector(message_seq, epoch)
            .is_some_and(FragmentCollector::is_message_complete)
    }

    /// Combined fragment for one message, marking it interpreted. Incomplete messages are
    /// returned filled.
    pub fn get_combined_message_fragment(
        &mut self,
        message_seq: u16,
        epoch: u16,
    ) -> Option<DtlsHandshakeFragment> {
        self.collectors
            .get_mut(&FragmentKey::new(message_seq, epoch))
            .map(FragmentCollector::build_combined_fragment)
    }

    /// Combined fragments of every message not yet interpreted, ordered by epoch and
    /// message sequence.
    ///
    /// With `only_complete` set, incomplete messages are left for later.
    pub fn get_ordered_combined_uninterpreted_message_fragments(
        &mut self,
        only_complete: bool,
    ) -> Vec<DtlsHandshakeFragment> {
        let mut keys: Vec<FragmentKey> = self
            .collectors
            .iter()
            .filter(|(_, c)| !c.is_interpreted())
            .filter(|(_, c)| !only_complete || c.is_message_complete())
            .map(|(k, _)| *k)
            .collect();
        keys.sort_by_key(|k| (k.epoch, k.message_seq));

        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(collector) = self.collectors.get_mut(&key) {
                out.push(collector.build_combined_fragment());
            }
        }
        out
    }

    pub fn clear_fragmented_message(&mut self, message_seq: u16, epoch: u16) {
        if self
            .collectors
            .remove(&FragmentKey::new(message_seq, epoch))
            .is_some()
        {
            debug!("Cleared message_seq {} epoch {}", message_seq, epoch);
        }
    }

    pub fn clear(&mut self) {
        self.collectors.clear();
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }
}
