use anyhow::{Context, Result, bail};
use std::{fs, path::Path};

use super::bank::Region;
use super::mapper;

pub const ROM_FLAG_BATTERY: u8 = 0x01;
pub const ROM_FLAG_TRAINER: u8 = 0x02;
pub const ROM_FLAG_FOURSCREEN: u8 = 0x04;
pub const ROM_FLAG_VERSUS: u8 = 0x08;

pub const PRG_BANK_SIZE: usize = 0x4000;
pub const CHR_BANK_SIZE: usize = 0x2000;
pub const SRAM_SIZE: usize = 0x2000;
pub const VRAM_SIZE: usize = 0x2000;

const HEADER_LEN: usize = 16;
const TRAINER_LEN: usize = 512;
const TRAINER_OFFSET: usize = 0x1000;
const DISPLAY_NAME_MAX: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mirroring {
    #[default]
    Horizontal,
    Vertical,
}

/// A loaded cartridge image plus the RAM regions it brings along.
#[derive(Debug, Clone, Default)]
pub struct Rom {
    pub(crate) prg: Vec<u8>,
    pub(crate) chr: Vec<u8>,
    pub(crate) sram: Vec<u8>,
    pub(crate) vram: Vec<u8>,
    pub mapper_number: u8,
    pub mirroring: Mirroring,
    pub flags: u8,
    pub name: String,
    pub(crate) notes: Vec<String>,
}

impl Rom {
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("failed to read ROM: {}", path.display()))?;
        let name = path
            .file_stem()
            .and_then(|v| v.to_str())
            .unwrap_or("rom")
            .to_string();
        Self::from_bytes(&bytes, &name)
            .with_context(|| format!("failed to load ROM: {}", path.display()))
    }

    pub fn from_bytes(bytes: &[u8], name: &str) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            bail!("{name} is too small to contain an iNES header");
        }
        if &bytes[0..4] != b"NES\x1A" {
            bail!("{name} is not a valid ROM image");
        }

        let prg_banks = bytes[4] as usize;
        let chr_banks = bytes[5] as usize;
        let flags6 = bytes[6];
        let flags7 = bytes[7];
        let reserved = &bytes[8..16];
        let mut notes = Vec::new();

        let mut flags = 0;
        if flags6 & 0x02 != 0 {
            flags |= ROM_FLAG_BATTERY;
        }
        if flags6 & 0x04 != 0 {
            flags |= ROM_FLAG_TRAINER;
        }
        if flags6 & 0x08 != 0 {
            flags |= ROM_FLAG_FOURSCREEN;
        }
        let mirroring = if flags6 & 0x01 != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        };

        let mut mapper_number = flags6 >> 4;
        if reserved.iter().all(|&b| b == 0) {
            mapper_number |= flags7 & 0xF0;
        } else if flags7 == b'D' && reserved == b"iskDude!" {
            notes.push("`DiskDude!' found in ROM header, ignoring high mapper nybble".to_string());
        } else {
            notes.push("ROM header dirty, possible problem".to_string());
            mapper_number |= flags7 & 0xF0;
        }

        if mapper_number == 99 {
            flags |= ROM_FLAG_VERSUS;
        }

        if !mapper::is_supported(mapper_number) {
            bail!("mapper {mapper_number} not yet implemented");
        }

        let mut cursor = HEADER_LEN;
        let mut sram = vec![0u8; SRAM_SIZE];
        if flags & ROM_FLAG_TRAINER != 0 {
            let trainer = bytes
                .get(cursor..cursor + TRAINER_LEN)
                .context("ROM truncated inside the trainer")?;
            sram[TRAINER_OFFSET..TRAINER_OFFSET + TRAINER_LEN].copy_from_slice(trainer);
            cursor += TRAINER_LEN;
            notes.push("Read in trainer at $7000".to_string());
        }

        if prg_banks == 0 {
            bail!("{name} has no PRG-ROM banks");
        }
        let prg_len = prg_banks * PRG_BANK_SIZE;
        let prg = bytes
            .get(cursor..cursor + prg_len)
            .with_context(|| format!("ROM truncated: expected {prg_len} PRG bytes"))?
            .to_vec();
        cursor += prg_len;

        let chr_len = chr_banks * CHR_BANK_SIZE;
        let (chr, vram) = if chr_banks > 0 {
            let chr = bytes
                .get(cursor..cursor + chr_len)
                .with_context(|| format!("ROM truncated: expected {chr_len} CHR bytes"))?
                .to_vec();
            (chr, Vec::new())
        } else {
            (Vec::new(), vec![0u8; VRAM_SIZE])
        };

        Ok(Self {
            prg,
            chr,
            sram,
            vram,
            mapper_number,
            mirroring,
            flags,
            name: name.to_string(),
            notes,
        })
    }

    /// Number of 16KB PRG banks.
    pub fn prg_banks(&self) -> usize {
        self.prg.len() / PRG_BANK_SIZE
    }

    /// Number of 8KB CHR-ROM banks; zero for CHR-RAM boards.
    pub fn chr_banks(&self) -> usize {
        self.chr.len() / CHR_BANK_SIZE
    }

    pub fn has_chr_rom(&self) -> bool {
        !self.chr.is_empty()
    }

    pub fn has_vram(&self) -> bool {
        !self.vram.is_empty()
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    pub fn sram(&self) -> &[u8] {
        &self.sram
    }

    /// One-line summary, e.g. `smb [0] 32k/8k V` followed by battery, trainer and four-screen marks.
    pub fn info(&self) -> String {
        let mut info = if self.name.chars().count() > DISPLAY_NAME_MAX {
            let short: String = self.name.chars().take(DISPLAY_NAME_MAX - 3).collect();
            format!("{short}...")
        } else {
            self.name.clone()
        };
        info.push_str(&format!(
            " [{}] {}k/{}k {}",
            self.mapper_number,
            self.prg_banks() * 16,
            self.chr_banks() * 8,
            if self.mirroring == Mirroring::Vertical {
                'V'
            } else {
                'H'
            }
        ));
        if self.has_flag(ROM_FLAG_BATTERY) {
            info.push('B');
        }
        if self.has_flag(ROM_FLAG_TRAINER) {
            info.push('T');
        }
        if self.has_flag(ROM_FLAG_FOURSCREEN) {
            info.push('4');
        }
        info
    }

    pub(crate) fn region(&self, region: Region) -> &[u8] {
        match region {
            Region::Prg => &self.prg,
            Region::Chr => &self.chr,
            Region::Sram => &self.sram,
            Region::Vram => &self.vram,
            _ => &[],
        }
    }

    pub(crate) fn region_mut(&mut self, region: Region) -> Option<&mut [u8]> {
        match region {
            Region::Sram => Some(&mut self.sram),
            Region::Vram => Some(&mut self.vram),
            _ => None,
        }
    }

    pub(crate) fn read(&self, region: Region, index: usize) -> u8 {
        let data = self.region(region);
        if data.is_empty() {
            0
        } else {
            data[index % data.len()]
        }
    }

    pub(crate) fn write(&mut self, region: Region, index: usize, value: u8) {
        if let Some(data) = self.region_mut(region) {
            if !data.is_empty() {
                let len = data.len();
                data[index % len] = value;
            }
        }
    }
}
