//! Machine variants and their DIP-switch strapping.

use serde::{Deserialize, Serialize};

/// Keyboard/PPI wiring of one machine model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MachineVariant {
    /// IBM 5150 with the original 16-64 KiB planar.
    #[serde(rename = "pc-1981")]
    Pc1981,
    /// IBM 5150 with the 64-256 KiB planar; port C reports memory directly.
    #[serde(rename = "pc-1982")]
    Pc1982,
    #[serde(rename = "xt-1982")]
    Xt1982,
    #[default]
    #[serde(rename = "xt-1986")]
    Xt1986,
    #[serde(rename = "tandy-1000")]
    Tandy1000,
    #[cfg(feature = "laserxt")]
    #[serde(rename = "laserxt-3")]
    LaserXt3,
}

impl MachineVariant {
    pub const ALL: &'static [MachineVariant] = &[
        MachineVariant::Pc1981,
        MachineVariant::Pc1982,
        MachineVariant::Xt1982,
        MachineVariant::Xt1986,
        MachineVariant::Tandy1000,
        #[cfg(feature = "laserxt")]
        MachineVariant::LaserXt3,
    ];

    /// Numeric type code used by the port decode (0..=5).
    pub const fn type_code(self) -> u8 {
        match self {
            MachineVariant::Pc1981 => 0,
            MachineVariant::Pc1982 => 1,
            MachineVariant::Xt1982 => 2,
            MachineVariant::Xt1986 => 3,
            MachineVariant::Tandy1000 => 4,
            #[cfg(feature = "laserxt")]
            MachineVariant::LaserXt3 => 5,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            MachineVariant::Pc1981 => "IBM PC Keyboard (1981)",
            MachineVariant::Pc1982 => "IBM PC Keyboard (1982)",
            MachineVariant::Xt1982 => "XT (1982) Keyboard",
            MachineVariant::Xt1986 => "XT (1986) Keyboard",
            MachineVariant::Tandy1000 => "Tandy 1000 Keyboard",
            #[cfg(feature = "laserxt")]
            MachineVariant::LaserXt3 => "VTech Laser XT3 Keyboard",
        }
    }

    /// IBM PC (both planars): DIP switches also readable through port 0x60.
    pub const fn is_pc(self) -> bool {
        self.type_code() <= 1
    }

    /// IBM XT: second switch bank on port 0x63, port 0x60 floats while strapped.
    pub const fn is_xt(self) -> bool {
        matches!(self.type_code(), 2 | 3)
    }

    pub const fn is_tandy(self) -> bool {
        self.type_code() == 4
    }

    #[cfg(feature = "laserxt")]
    pub const fn is_laserxt(self) -> bool {
        self.type_code() == 5
    }

    #[cfg(not(feature = "laserxt"))]
    pub const fn is_laserxt(self) -> bool {
        false
    }

    /// Variants whose strap register is built from DIP switches at attach time.
    pub const fn has_dip_switches(self) -> bool {
        self.type_code() <= 3
    }

    /// Bracket boundaries (KiB) for the two memory switches, lowest first.
    fn memory_brackets(self) -> Option<[u32; 4]> {
        match self.type_code() {
            0 | 1 => Some([16, 32, 48, 64]),
            2 => Some([64, 128, 192, 256]),
            3 => Some([256, 512, 576, 640]),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VideoAdapter {
    Mda,
    #[default]
    Cga,
}

/// Outward description of one selectable keyboard device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub name: &'static str,
    pub variant: MachineVariant,
}

pub const DESCRIPTORS: &[DeviceDescriptor] = &[
    DeviceDescriptor {
        name: MachineVariant::Pc1981.name(),
        variant: MachineVariant::Pc1981,
    },
    DeviceDescriptor {
        name: MachineVariant::Pc1982.name(),
        variant: MachineVariant::Pc1982,
    },
    DeviceDescriptor {
        name: MachineVariant::Xt1982.name(),
        variant: MachineVariant::Xt1982,
    },
    DeviceDescriptor {
        name: MachineVariant::Xt1986.name(),
        variant: MachineVariant::Xt1986,
    },
    DeviceDescriptor {
        name: MachineVariant::Tandy1000.name(),
        variant: MachineVariant::Tandy1000,
    },
    #[cfg(feature = "laserxt")]
    DeviceDescriptor {
        name: MachineVariant::LaserXt3.name(),
        variant: MachineVariant::LaserXt3,
    },
];

pub fn descriptor_by_name(name: &str) -> Option<&'static DeviceDescriptor> {
    DESCRIPTORS.iter().find(|d| d.name == name)
}

const DIP_IPL_DRIVE: u8 = 0x01;
const DIP_VIDEO_MDA: u8 = 0x30;
const DIP_VIDEO_CGA80: u8 = 0x20;

/// Builds the strap register for variants with DIP switches; 0 for the others.
///
/// Layout (switch 1 is bit 0):
/// - bits 6-7: floppy drive count minus one, bit 0 set when any drive is fitted;
/// - bits 4-5: initial video mode;
/// - bits 2-3: planar memory bracket.
pub fn compute_dip(
    variant: MachineVariant,
    floppy_drives: u8,
    video: VideoAdapter,
    memory_kib: u32,
) -> u8 {
    let Some(brackets) = variant.memory_brackets() else {
        return 0;
    };

    let mut pd = 0u8;
    if floppy_drives > 0 {
        pd |= (((floppy_drives - 1) & 0x03) << 6) | DIP_IPL_DRIVE;
    }

    pd |= match video {
        VideoAdapter::Mda => DIP_VIDEO_MDA,
        VideoAdapter::Cga => DIP_VIDEO_CGA80,
    };

    let bracket = match brackets.iter().position(|&kib| kib == memory_kib) {
        Some(idx) => idx as u8,
        None => {
            tracing::warn!(
                memory_kib,
                variant = variant.name(),
                "XT keyboard: memory size matches no DIP setting, strapping maximum"
            );
            3
        }
    };
    pd |= bracket << 2;
    pd |= DIP_IPL_DRIVE;

    tracing::debug!(
        variant = variant.name(),
        floppy_drives,
        ?video,
        memory_kib,
        "XT keyboard: DIP switches {pd:02X}"
    );
    pd
}
