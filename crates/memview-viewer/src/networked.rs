//! 変更検出・パケット化まで組み込んだ viewer

use memview_grid::{ChangeSink, ReactiveGrid, RowGrid};
use memview_region::RegionOracle;
use memview_wire::{EncoderStats, WireEncoder};

use crate::config::{ConfigError, ViewerConfig};
use crate::viewer::MemoryViewer;

/// 読み出しごとの差分をワイヤーパケットにして溜める viewer
///
/// ```text
/// RegionOracle → MemoryViewer → ReactiveGrid → WireEncoder → take_packets()
/// ```
pub type NetworkedGrid<O> = MemoryViewer<O, ReactiveGrid<WireEncoder>>;

impl<O: RegionOracle, S: ChangeSink> MemoryViewer<O, ReactiveGrid<S>> {
    /// 行グリッド付きの viewer を作る。変更イベントは `sink` に届く
    pub fn reactive(oracle: O, config: &ViewerConfig, sink: S) -> Result<Self, ConfigError> {
        config.validate()?;
        let grid = RowGrid::new(config.cols, config.min_address, config.effective_max_address()?);
        Self::with_hook(oracle, config, ReactiveGrid::new(grid, sink))
    }

    pub fn grid(&self) -> &RowGrid {
        self.hook().grid()
    }
}

impl<O: RegionOracle> MemoryViewer<O, ReactiveGrid<WireEncoder>> {
    pub fn networked(oracle: O, config: &ViewerConfig) -> Result<Self, ConfigError> {
        Self::reactive(oracle, config, WireEncoder::new(config.cols))
    }

    /// コミット済みのパケットを取り出す（古い順）
    pub fn take_packets(&mut self) -> Vec<Vec<u8>> {
        self.hook_mut().sink_mut().take_packets()
    }

    pub fn encoder_stats(&self) -> EncoderStats {
        self.hook().sink().stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memview_region::MappedSpace;
    use memview_wire::WireDecoder;

    #[test]
    fn test_packets_replay_into_decoder() {
        let mut space = MappedSpace::new();
        space.map(0x1000, (0u8..=255).collect(), 0x04);
        let config = ViewerConfig {
            cursor: 0x1008,
            read_length: 0x20,
            ..ViewerConfig::new(16)
        };
        let mut viewer = NetworkedGrid::networked(space, &config).unwrap();
        let mut decoder = WireDecoder::new(16);

        viewer.refresh();
        let packets = viewer.take_packets();
        assert_eq!(packets.len(), 1);
        for p in &packets {
            decoder.apply_packet(p).unwrap();
        }

        assert_eq!(decoder.rows().collect::<Vec<_>>(), vec![0x1000, 0x1010, 0x1020]);
        assert_eq!(decoder.byte_at(0x1000, 8), Some(8));
        assert_eq!(decoder.byte_at(0x1000, 7), None);
        assert_eq!(decoder.byte_at(0x1020, 7), Some(0x27));

        // 変化なしの再読み出しはパケットを作らない
        viewer.refresh();
        assert!(viewer.take_packets().is_empty());
        assert_eq!(viewer.encoder_stats().packets, 1);
        assert_eq!(viewer.grid().cached_row_count(), 3);
    }
}
