use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::nes::Nes;
use crate::nes::apu::{CHAN_ALL, Filter};
use crate::nes::input::{DEV_JOYPAD0, DEV_JOYPAD1, Input};

/// Host-facing machine settings. Every field is optional in the JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NesConfig {
    pub sample_rate: u32,
    /// 8 for unsigned bytes, 16 for signed words.
    pub sample_bits: u8,
    pub refresh_rate: u32,
    pub filter: Filter,
    /// One bit per channel: pulse 1, pulse 2, triangle, noise, DMC, expansion.
    pub channel_mask: u8,
    pub draw_sprites: bool,
    /// Headless runs only draw the final frame.
    pub auto_frame_skip: bool,
    /// Devices plugged in at power-on.
    pub devices: u8,
}

impl Default for NesConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            sample_bits: 16,
            refresh_rate: 60,
            filter: Filter::Weighted,
            channel_mask: CHAN_ALL,
            draw_sprites: true,
            auto_frame_skip: true,
            devices: DEV_JOYPAD0 | DEV_JOYPAD1,
        }
    }
}

impl NesConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).context("invalid config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("failed to load config: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("failed to encode config")?;
        fs::write(path, text)
            .with_context(|| format!("failed to write config: {}", path.display()))
    }

    fn validate(&self) -> Result<()> {
        if self.sample_bits != 8 && self.sample_bits != 16 {
            bail!("sample_bits must be 8 or 16, got {}", self.sample_bits);
        }
        if self.sample_rate == 0 || self.refresh_rate == 0 {
            bail!("sample_rate and refresh_rate must be non-zero");
        }
        if self.refresh_rate > self.sample_rate {
            bail!(
                "refresh_rate {} exceeds sample_rate {}",
                self.refresh_rate,
                self.sample_rate
            );
        }
        Ok(())
    }

    /// Pushes the audio, video and input settings into a machine. Audio parameters
    /// reset the APU, so this belongs before a cartridge is inserted.
    pub fn apply(&self, nes: &mut Nes) {
        let apu = nes.apu_mut();
        apu.set_params(self.sample_rate, self.refresh_rate);
        apu.set_filter(self.filter);
        apu.set_mix_mask(self.channel_mask);
        nes.set_draw_sprites(self.draw_sprites);
        *nes.input_mut() = Input::new(self.devices);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nes::input::DEV_ZAPPER;

    #[test]
    fn missing_fields_take_defaults() {
        let config = NesConfig::from_json(r#"{ "sample_rate": 22050, "filter": "lowpass" }"#)
            .expect("partial config");
        assert_eq!(config.sample_rate, 22_050);
        assert_eq!(config.filter, Filter::Lowpass);
        assert_eq!(config.sample_bits, 16);
        assert_eq!(config.channel_mask, CHAN_ALL);
        assert!(config.draw_sprites);
    }

    #[test]
    fn unknown_filter_names_are_rejected() {
        let err = NesConfig::from_json(r#"{ "filter": "bright" }"#).expect_err("bad filter");
        let message = format!("{err:#}");
        assert!(message.contains("invalid config JSON"), "{message}");
        assert!(message.contains("bright"), "{message}");
    }

    #[test]
    fn odd_sample_widths_are_rejected() {
        assert!(NesConfig::from_json(r#"{ "sample_bits": 12 }"#).is_err());
        assert!(NesConfig::from_json(r#"{ "refresh_rate": 0 }"#).is_err());
    }

    #[test]
    fn save_then_load_preserves_settings() {
        let path = std::env::temp_dir().join(format!("nescore-config-{}.json", std::process::id()));
        let config = NesConfig {
            sample_bits: 8,
            filter: Filter::None,
            channel_mask: 0x1F,
            devices: DEV_JOYPAD0 | DEV_ZAPPER,
            ..NesConfig::default()
        };
        config.save(&path).expect("write temp config");
        let loaded = NesConfig::load(&path).expect("read temp config");
        let _ = fs::remove_file(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = NesConfig::load(Path::new("/nonexistent/nescore.json")).expect_err("missing");
        assert!(format!("{err}").contains("/nonexistent/nescore.json"));
    }

    #[test]
    fn apply_configures_the_machine() {
        let mut nes = Nes::new();
        let config = NesConfig {
            sample_rate: 48_000,
            refresh_rate: 50,
            devices: DEV_ZAPPER,
            ..NesConfig::default()
        };
        config.apply(&mut nes);
        assert_eq!(nes.samples_per_frame(), 960);
        assert_eq!(nes.input().connected(), DEV_ZAPPER);
    }
}
