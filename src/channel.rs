//! Mapping from displayed channel numbers to physical lane indices.
//!
//! Channels are numbered from 1 in the UI. Each GT1724 core carries two
//! channels; each board carries two cores. The pattern generator, error
//! detector, and eye scanner each have their own lane numbering derived from
//! the same channel number. These mappings are pure data; a channel carries
//! no ownership over hardware and may be recomputed at any time.

/// Largest supported channel number; lane indices for larger channels
/// would not fit the index width.
pub const MAX_CHANNEL: u16 = u16::MAX / 2;

/// Physical indices for one displayed channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BertChannel {
    channel: u16,
    core: u16,
    board: u16,
    pg_lane: u16,
    ed_lane: u16,
    es_lane: u16,
    ct_lane: u16,
}

/// Core-temperature display slot for channels that carry one.
///
/// There is one temperature reading per GT1724 chip, so only every second
/// channel has a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TemperatureSlot {
    /// "Master" for the first core of a pair, "Slave" for the second.
    pub role: &'static str,
    /// Core group within the board: 1 or 2.
    pub group: u8,
}

impl TemperatureSlot {
    /// Display label, e.g. `"Master 1"`.
    pub fn label(&self) -> String {
        format!("{} {}", self.role, self.group)
    }
}

impl BertChannel {
    /// Derive the physical indices for a displayed channel number.
    ///
    /// `channel` starts at 1; 0 or a value above [`MAX_CHANNEL`] is a
    /// caller contract violation.
    pub fn new(channel: u16) -> Self {
        assert!(
            (1..=MAX_CHANNEL).contains(&channel),
            "Channel numbers are 1-based and bounded by MAX_CHANNEL"
        );
        Self {
            channel,
            core: (channel - 1) / 2,
            board: (channel - 1) / 4,
            pg_lane: (channel - 1) * 2,
            ed_lane: channel * 2 - 1,
            es_lane: channel * 2 - 1,
            ct_lane: (channel - 1) * 2,
        }
    }

    /// Displayed channel number (1-based).
    pub fn channel(&self) -> u16 {
        self.channel
    }

    /// GT1724 IC index: 0, 0, 1, 1, 2, ...
    pub fn core(&self) -> u16 {
        self.core
    }

    /// Board index: 0, 0, 0, 0, 1, ...
    pub fn board(&self) -> u16 {
        self.board
    }

    /// Pattern generator lane: 0, 2, 4, ...
    pub fn pg_lane(&self) -> u16 {
        self.pg_lane
    }

    /// Error detector lane: 1, 3, 5, ...
    pub fn ed_lane(&self) -> u16 {
        self.ed_lane
    }

    /// Eye scanner lane: same numbering as the error detector.
    pub fn es_lane(&self) -> u16 {
        self.es_lane
    }

    /// Core temperature lane: 0, x, 4, x, 8, ... (even lanes only carry a
    /// reading; see [`Self::temperature_slot`]).
    pub fn ct_lane(&self) -> u16 {
        self.ct_lane
    }

    /// Temperature display slot, present for one channel per GT1724 chip.
    pub fn temperature_slot(&self) -> Option<TemperatureSlot> {
        if self.ct_lane % 4 != 0 {
            return None;
        }
        // Roles alternate per chip: even cores are the master core of their
        // pair, odd cores the slave.
        Some(TemperatureSlot {
            role: if self.ct_lane % 8 == 0 { "Master" } else { "Slave" },
            group: (self.core % 2) as u8 + 1,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_channel_1_mapping() {
        let ch = BertChannel::new(1);
        assert_eq!(ch.core(), 0);
        assert_eq!(ch.board(), 0);
        assert_eq!(ch.pg_lane(), 0);
        assert_eq!(ch.ed_lane(), 1);
        assert_eq!(ch.es_lane(), 1);
        assert_eq!(ch.ct_lane(), 0);

        let slot = ch.temperature_slot().unwrap();
        assert_eq!(slot.role, "Master");
        assert_eq!(slot.group, 1);
        assert_eq!(slot.label(), "Master 1");
    }

    #[test]
    fn test_channel_3_mapping() {
        let ch = BertChannel::new(3);
        assert_eq!(ch.core(), 1);
        assert_eq!(ch.board(), 0);
        assert_eq!(ch.pg_lane(), 4);
        assert_eq!(ch.ed_lane(), 5);
        assert_eq!(ch.es_lane(), 5);
        assert_eq!(ch.ct_lane(), 4);

        let slot = ch.temperature_slot().unwrap();
        assert_eq!(slot.role, "Slave");
        assert_eq!(slot.group, 2);
    }

    #[test]
    fn test_channel_5_mapping() {
        let ch = BertChannel::new(5);
        assert_eq!(ch.core(), 2);
        assert_eq!(ch.board(), 1);
        assert_eq!(ch.pg_lane(), 8);
        assert_eq!(ch.ed_lane(), 9);
        assert_eq!(ch.es_lane(), 9);
        assert_eq!(ch.ct_lane(), 8);

        let slot = ch.temperature_slot().unwrap();
        assert_eq!(slot.role, "Master");
        assert_eq!(slot.group, 1);
    }

    #[test]
    fn test_even_channels_have_no_temperature_slot() {
        for channel in [2, 4, 6, 8] {
            assert!(BertChannel::new(channel).temperature_slot().is_none());
        }
    }

    #[test]
    fn test_mapping_is_exact_for_large_channel_numbers() {
        let ch = BertChannel::new(300);
        assert_eq!(ch.core(), 149);
        assert_eq!(ch.board(), 74);
        assert_eq!(ch.pg_lane(), 598);
        assert_eq!(ch.ed_lane(), 599);
        assert_eq!(ch.es_lane(), 599);
        assert_eq!(ch.ct_lane(), 598);
    }

    #[test]
    #[should_panic]
    fn test_channel_zero_is_a_contract_violation() {
        let _ = BertChannel::new(0);
    }

    #[test]
    #[should_panic]
    fn test_channel_above_supported_range_is_a_contract_violation() {
        let _ = BertChannel::new(MAX_CHANNEL + 1);
    }
}
