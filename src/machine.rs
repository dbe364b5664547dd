//! Target hardware and platform profiles.

use anyhow::{bail, Result};
use std::fmt;
use std::str::FromStr;

/// A raw bootloader blob written at a fixed offset of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootloaderWrite {
    /// Source file, relative to the customized root filesystem.
    pub source: &'static str,
    /// `dd` block size.
    pub block_size: &'static str,
    /// Offset in blocks of `block_size`.
    pub seek: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Machine {
    Dreamplug,
    Raspberry,
    Raspberry2,
    Beaglebone,
    Cubieboard2,
    Cubietruck,
    A20OlinuxinoLime,
    A20OlinuxinoLime2,
    A20OlinuxinoMicro,
    Pcduino3,
    Virtualbox,
    Qemu,
    Amd64,
    I386,
}

impl Machine {
    pub const ALL: [Machine; 14] = [
        Machine::Dreamplug,
        Machine::Raspberry,
        Machine::Raspberry2,
        Machine::Beaglebone,
        Machine::Cubieboard2,
        Machine::Cubietruck,
        Machine::A20OlinuxinoLime,
        Machine::A20OlinuxinoLime2,
        Machine::A20OlinuxinoMicro,
        Machine::Pcduino3,
        Machine::Virtualbox,
        Machine::Qemu,
        Machine::Amd64,
        Machine::I386,
    ];

    /// Identifier as used in the `MACHINE` variable.
    pub fn name(self) -> &'static str {
        match self {
            Machine::Dreamplug => "dreamplug",
            Machine::Raspberry => "raspberry",
            Machine::Raspberry2 => "raspberry2",
            Machine::Beaglebone => "beaglebone",
            Machine::Cubieboard2 => "cubieboard2",
            Machine::Cubietruck => "cubietruck",
            Machine::A20OlinuxinoLime => "a20-olinuxino-lime",
            Machine::A20OlinuxinoLime2 => "a20-olinuxino-lime2",
            Machine::A20OlinuxinoMicro => "a20-olinuxino-micro",
            Machine::Pcduino3 => "pcduino3",
            Machine::Virtualbox => "virtualbox",
            Machine::Qemu => "qemu",
            Machine::Amd64 => "amd64",
            Machine::I386 => "i386",
        }
    }

    /// Raspberry Pi firmware boots from its own FAT partition mounted at
    /// `/boot/firmware`.
    pub fn needs_firmware_partition(self) -> bool {
        matches!(self, Machine::Raspberry | Machine::Raspberry2)
    }

    /// u-boot SPL image for Allwinner (sunxi) boards.
    fn sunxi_spl(self) -> Option<&'static str> {
        match self {
            Machine::Cubieboard2 => Some("usr/lib/u-boot/Cubieboard2/u-boot-sunxi-with-spl.bin"),
            Machine::Cubietruck => Some("usr/lib/u-boot/Cubietruck/u-boot-sunxi-with-spl.bin"),
            Machine::A20OlinuxinoLime => {
                Some("usr/lib/u-boot/A20-OLinuXino-Lime/u-boot-sunxi-with-spl.bin")
            }
            Machine::A20OlinuxinoLime2 => {
                Some("usr/lib/u-boot/A20-OLinuXino-Lime2/u-boot-sunxi-with-spl.bin")
            }
            Machine::A20OlinuxinoMicro => {
                Some("usr/lib/u-boot/A20-OLinuXino_MICRO/u-boot-sunxi-with-spl.bin")
            }
            Machine::Pcduino3 => {
                Some("usr/lib/u-boot/Linksprite_pcDuino3/u-boot-sunxi-with-spl.bin")
            }
            _ => None,
        }
    }

    /// Bootloader blobs to write onto the raw image, in order.
    pub fn bootloader_writes(self) -> Vec<BootloaderWrite> {
        if self == Machine::Beaglebone {
            return vec![
                BootloaderWrite {
                    source: "usr/lib/u-boot/am335x_boneblack/MLO",
                    block_size: "128k",
                    seek: 1,
                },
                BootloaderWrite {
                    source: "usr/lib/u-boot/am335x_boneblack/u-boot.img",
                    block_size: "384k",
                    seek: 1,
                },
            ];
        }

        self.sunxi_spl()
            .map(|source| BootloaderWrite {
                source,
                block_size: "1k",
                seek: 8,
            })
            .into_iter()
            .collect()
    }
}

impl fmt::Display for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Machine {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        for machine in Machine::ALL {
            if machine.name() == wanted {
                return Ok(machine);
            }
        }
        let known: Vec<&str> = Machine::ALL.iter().map(|m| m.name()).collect();
        bail!(
            "Unknown MACHINE '{}'. Known machines: {}",
            wanted,
            known.join(", ")
        )
    }
}
