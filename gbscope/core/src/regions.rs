//! Per-bank address regions derived from the symbol map, plus the sticky
//! PC-to-region resolver.

use crate::symbols::SymbolMap;
use serde::Serialize;
use std::collections::HashMap;

/// First address of the switchable ROM window.
pub const BANKED_BASE: u16 = 0x4000;
/// Last address of the fixed home bank.
pub const BANK0_END: u16 = 0x3FFF;
/// Last address of a switchable bank.
pub const BANKED_END: u16 = 0x7FFF;

/// A contiguous `[addr, end]` range within one bank attributed to a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Region {
    /// Symbol index in the map this range belongs to.
    pub sym: usize,
    pub bank: u8,
    pub addr: u16,
    pub end: u16,
}

impl Region {
    pub fn contains(&self, pc: u16) -> bool {
        self.addr <= pc && pc <= self.end
    }
}

fn bank_end(bank: u8) -> u16 {
    if bank == 0 {
        BANK0_END
    } else {
        BANKED_END
    }
}

/// Regions grouped by bank, sorted by start address within each bank.
///
/// Within a bank every region ends one byte before the next symbol; the
/// last one extends to the end of the bank window.
#[derive(Debug, Clone, Default)]
pub struct RegionTable {
    banks: HashMap<u8, Vec<Region>>,
}

impl RegionTable {
    pub fn build(map: &SymbolMap) -> RegionTable {
        let mut banks: HashMap<u8, Vec<Region>> = HashMap::new();
        for (sym, symbol) in map.symbols().iter().enumerate() {
            banks.entry(symbol.bank).or_default().push(Region {
                sym,
                bank: symbol.bank,
                addr: symbol.addr,
                end: 0,
            });
        }
        for (&bank, regions) in banks.iter_mut() {
            regions.sort_by_key(|r| r.addr);
            let max = bank_end(bank);
            for i in 0..regions.len() {
                let end = match regions.get(i + 1) {
                    Some(next) => max.min(next.addr.saturating_sub(1)),
                    None => max,
                };
                regions[i].end = end.max(regions[i].addr);
            }
        }
        RegionTable { banks }
    }

    /// The unique region in `bank` containing `pc`, if any.
    pub fn find(&self, bank: u8, pc: u16) -> Option<Region> {
        let regions = self.banks.get(&bank)?;
        let idx = regions.partition_point(|r| r.addr <= pc);
        let region = *regions.get(idx.checked_sub(1)?)?;
        region.contains(pc).then_some(region)
    }

    pub fn bank(&self, bank: u8) -> &[Region] {
        self.banks.get(&bank).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Bank ids present in the table, ascending.
    pub fn bank_ids(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = self.banks.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Resolves `(pc, current ROM bank)` to a region with a sticky fast path.
///
/// The cached region serves the common case cheaply and adds hysteresis so
/// bank transitions do not oscillate. Cache update policy belongs to the
/// call-stack engine: `lookup` never mutates it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PcResolver {
    current: Option<Region>,
}

impl PcResolver {
    pub fn lookup(&self, table: &RegionTable, pc: u16, rom_bank: u8) -> Option<Region> {
        if let Some(cur) = self.current {
            if cur.contains(pc) && (pc < BANKED_BASE || cur.bank == rom_bank) {
                return Some(cur);
            }
        }
        let bank = if pc < BANKED_BASE { 0 } else { rom_bank };
        table.find(bank, pc)
    }

    pub fn current(&self) -> Option<Region> {
        self.current
    }

    pub fn set_current(&mut self, region: Option<Region>) {
        self.current = region;
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(text: &str) -> (SymbolMap, RegionTable) {
        let map = SymbolMap::parse(text);
        let table = RegionTable::build(&map);
        (map, table)
    }

    #[test]
    fn regions_tile_each_bank_to_its_end() {
        let (map, table) = table("DEF _main 0x0150\nDEF _foo 0x0200\nDEF _far 0x024100\n");
        let main = table.find(0, 0x0150).expect("main region");
        assert_eq!(map.name(main.sym), "_main");
        assert_eq!(main.end, 0x01FF);
        let foo = table.find(0, 0x0200).expect("foo region");
        assert_eq!(foo.end, BANK0_END);
        let far = table.find(2, 0x4100).expect("far region");
        assert_eq!(far.end, BANKED_END);
    }

    #[test]
    fn pc_at_region_end_resolves_to_that_region_not_the_next() {
        let (map, table) = table("DEF _a 0x0100\nDEF _b 0x0200\n");
        let hit = table.find(0, 0x01FF).expect("end of _a");
        assert_eq!(map.name(hit.sym), "_a");
        let next = table.find(0, 0x0200).expect("start of _b");
        assert_eq!(map.name(next.sym), "_b");
    }

    #[test]
    fn vector_regions_cover_the_gap_up_to_the_first_user_symbol() {
        let (map, table) = table("DEF _main 0x0150\n");
        let joy = table.find(0, 0x0100).expect("JOY tail region");
        assert_eq!(map.name(joy.sym), "[INTERRUPT] JOY");
        assert_eq!(joy.addr, 0x60);
        assert_eq!(joy.end, 0x014F);
    }

    #[test]
    fn no_region_below_the_first_symbol_of_a_bank() {
        let (_, table) = table("DEF _x 0x014100\n");
        assert!(table.find(1, 0x4000).is_none());
        assert!(table.find(1, 0x4100).is_some());
    }

    #[test]
    fn same_bank_regions_are_disjoint_and_monotonic() {
        let (_, table) = table("DEF _c 0x0300\nDEF _a 0x0100\nDEF _b 0x0200\n");
        let regions = table.bank(0);
        for pair in regions.windows(2) {
            assert!(pair[0].addr <= pair[0].end);
            assert!(pair[0].end < pair[1].addr, "{pair:?} must not overlap");
        }
    }

    #[test]
    fn sticky_lookup_prefers_the_cached_region() {
        let (_, table) = table("DEF _a 0x0100\nDEF _b 0x0200\n");
        let mut resolver = PcResolver::default();
        let a = table.find(0, 0x0100).expect("region _a");
        resolver.set_current(Some(a));
        assert_eq!(resolver.lookup(&table, 0x01A0, 0), Some(a));
        // Out of range falls through to the table.
        let b = resolver.lookup(&table, 0x0200, 0).expect("region _b");
        assert_ne!(b, a);
        // lookup never updated the cache on its own.
        assert_eq!(resolver.current(), Some(a));
    }

    #[test]
    fn sticky_banked_region_requires_matching_rom_bank() {
        let (_, banked) = table("DEF _one 0x014100\nDEF _two 0x024100\n");
        let mut resolver = PcResolver::default();
        let one = banked.find(1, 0x4100).expect("bank 1 region");
        resolver.set_current(Some(one));
        // Same pc, different mapped bank: the cache must not answer.
        let two = resolver.lookup(&banked, 0x4100, 2).expect("bank 2 region");
        assert_eq!(two.bank, 2);
        // Home-bank pc keeps the cache valid regardless of the ROM bank.
        let (_, home) = table("DEF _main 0x0150\n");
        let main = home.find(0, 0x0150).expect("main");
        resolver.set_current(Some(main));
        assert_eq!(resolver.lookup(&home, 0x0160, 7), Some(main));
    }
}
