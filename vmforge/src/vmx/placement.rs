//! Bus unit and file-name assignment for disks and the CD-ROM.
//!
//! The primary disk is always unit 0 on its bus. The CD-ROM takes unit 1
//! when it shares the disk bus, otherwise unit 0 on its own bus. Additional
//! disks follow on the disk bus.
//!
//! Unit 7 is reserved by the platform and is never assigned. Once the unit
//! sequence reaches it, every later disk is shifted one unit further. The
//! seventh additional disk likewise skips disk number 7, so file names
//! jump from `-6` to `-8`. Both offsets are permanent and applied once.

use crate::config::BusType;

/// The reserved bus unit.
pub const RESERVED_UNIT: usize = 7;

/// 1-based position of the additional disk whose number is skipped.
const RESERVED_POSITION: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskSlot {
    /// Number used in the file name, `{disk_name}-{disk_number}.vmdk`.
    pub disk_number: usize,
    pub unit: usize,
    pub file_name: String,
    /// Whether this slot sits past the reserved unit.
    pub past_reserved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePlacement {
    pub disk_bus: BusType,
    pub cdrom_bus: BusType,
    pub primary_file_name: String,
    pub cdrom_unit: usize,
    pub additional: Vec<DiskSlot>,
}

impl DevicePlacement {
    pub fn compute(
        disk_bus: BusType,
        cdrom_bus: BusType,
        disk_name: &str,
        additional_disks: usize,
    ) -> Self {
        let shared = disk_bus == cdrom_bus;
        let cdrom_unit = if shared { 1 } else { 0 };
        let mut unit_skip = if shared { 2 } else { 1 };
        let mut incrementer = 1;
        let mut past_reserved = false;

        let additional = (0..additional_disks)
            .map(|i| {
                if i + unit_skip == RESERVED_UNIT {
                    unit_skip += 1;
                    past_reserved = true;
                }
                if i + 1 == RESERVED_POSITION {
                    incrementer += 1;
                }
                let disk_number = i + incrementer;
                DiskSlot {
                    disk_number,
                    unit: i + unit_skip,
                    file_name: format!("{}-{}.vmdk", disk_name, disk_number),
                    past_reserved,
                }
            })
            .collect();

        Self {
            disk_bus,
            cdrom_bus,
            primary_file_name: format!("{}.vmdk", disk_name),
            cdrom_unit,
            additional,
        }
    }

    pub fn shares_bus(&self) -> bool {
        self.disk_bus == self.cdrom_bus
    }

    /// Device key of the CD-ROM, e.g. `ide0:1`.
    pub fn cdrom_device(&self) -> String {
        format!("{}0:{}", self.cdrom_bus, self.cdrom_unit)
    }

    /// Whether every assigned disk unit is below `capacity`.
    pub fn fits(&self, capacity: usize) -> bool {
        let used = if self.shares_bus() { 2 } else { 1 };
        match self.additional.last() {
            Some(slot) => slot.unit < capacity,
            None => used <= capacity,
        }
    }

    /// All disk file names, primary first.
    pub fn file_names(&self) -> Vec<&str> {
        std::iter::once(self.primary_file_name.as_str())
            .chain(self.additional.iter().map(|slot| slot.file_name.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn units(p: &DevicePlacement) -> Vec<usize> {
        p.additional.iter().map(|s| s.unit).collect()
    }

    fn numbers(p: &DevicePlacement) -> Vec<usize> {
        p.additional.iter().map(|s| s.disk_number).collect()
    }

    #[test]
    fn test_shared_bus_eight_disks() {
        let p = DevicePlacement::compute(BusType::Scsi, BusType::Scsi, "disk", 8);
        assert_eq!(p.cdrom_unit, 1);
        assert_eq!(units(&p), vec![2, 3, 4, 5, 6, 8, 9, 10]);
        assert_eq!(numbers(&p), vec![1, 2, 3, 4, 5, 6, 8, 9]);
        assert_eq!(p.cdrom_device(), "scsi0:1");
    }

    #[test]
    fn test_separate_bus_eight_disks() {
        let p = DevicePlacement::compute(BusType::Scsi, BusType::Ide, "disk", 8);
        assert_eq!(p.cdrom_unit, 0);
        assert_eq!(units(&p), vec![1, 2, 3, 4, 5, 6, 8, 9]);
        assert_eq!(numbers(&p), vec![1, 2, 3, 4, 5, 6, 8, 9]);
        assert_eq!(p.cdrom_device(), "ide0:0");
    }

    #[test]
    fn test_file_names() {
        let p = DevicePlacement::compute(BusType::Sata, BusType::Sata, "root", 7);
        assert_eq!(p.primary_file_name, "root.vmdk");
        assert_eq!(p.additional[5].file_name, "root-6.vmdk");
        assert_eq!(p.additional[6].file_name, "root-8.vmdk");
        assert_eq!(p.file_names().len(), 8);
    }

    #[test]
    fn test_no_additional_disks() {
        let p = DevicePlacement::compute(BusType::Nvme, BusType::Sata, "disk", 0);
        assert!(p.additional.is_empty());
        assert_eq!(p.file_names(), vec!["disk.vmdk"]);
        assert!(p.fits(BusType::Nvme.unit_capacity()));
    }

    #[test]
    fn test_reserved_flag_set_from_shift() {
        let p = DevicePlacement::compute(BusType::Scsi, BusType::Scsi, "disk", 7);
        assert!(!p.additional[4].past_reserved);
        assert!(p.additional[5].past_reserved);
        assert!(p.additional[6].past_reserved);
    }

    #[test]
    fn test_shared_ide_bus_is_full() {
        let p = DevicePlacement::compute(BusType::Ide, BusType::Ide, "disk", 1);
        assert!(!p.fits(BusType::Ide.unit_capacity()));
        let p = DevicePlacement::compute(BusType::Ide, BusType::Ide, "disk", 0);
        assert!(p.fits(BusType::Ide.unit_capacity()));
    }

    proptest! {
        #[test]
        fn prop_units_skip_reserved_once(count in 0usize..40, shared in any::<bool>()) {
            let cdrom = if shared { BusType::Scsi } else { BusType::Sata };
            let p = DevicePlacement::compute(BusType::Scsi, cdrom, "disk", count);
            let units = units(&p);

            prop_assert!(!units.contains(&RESERVED_UNIT));
            prop_assert!(!units.contains(&p.cdrom_unit) || !shared);
            prop_assert!(!units.contains(&0));

            let gaps = units.windows(2).filter(|w| w[1] - w[0] == 2).count();
            prop_assert!(units.windows(2).all(|w| w[1] - w[0] == 1 || w[1] - w[0] == 2));
            let start = if shared { 2 } else { 1 };
            let crosses = count > RESERVED_UNIT - start;
            prop_assert_eq!(gaps, usize::from(crosses));
        }

        #[test]
        fn prop_numbers_strictly_increase(count in 0usize..40, shared in any::<bool>()) {
            let cdrom = if shared { BusType::Sata } else { BusType::Ide };
            let p = DevicePlacement::compute(BusType::Sata, cdrom, "disk", count);
            let numbers = numbers(&p);
            prop_assert!(numbers.windows(2).all(|w| w[1] > w[0]));
            prop_assert!(!numbers.contains(&RESERVED_POSITION));
            for (i, n) in numbers.iter().enumerate() {
                let expected = if i + 1 >= RESERVED_POSITION { i + 2 } else { i + 1 };
                prop_assert_eq!(*n, expected);
            }
        }
    }
}
