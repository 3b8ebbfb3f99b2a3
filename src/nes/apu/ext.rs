use super::{DUTY_FLIP, Timing, decay_output};

/// Cartridge sound hardware a mapper can bring along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtKind {
    Mmc5,
    Vrc6,
    Fds,
    Vrc7,
}

impl ExtKind {
    pub fn name(self) -> &'static str {
        match self {
            ExtKind::Mmc5 => "MMC5",
            ExtKind::Vrc6 => "VRC6",
            ExtKind::Fds => "FDS",
            ExtKind::Vrc7 => "VRC7",
        }
    }
}

/// An extra sound channel mixed in after the five built-in ones. Its register ranges
/// are checked by the bus before the mapper's own.
pub trait SoundExt {
    fn kind(&self) -> ExtKind;

    fn reset(&mut self, timing: &Timing);

    /// Produces one output sample.
    fn process(&mut self) -> i32;

    fn write_ranges(&self) -> &'static [(u16, u16)];

    fn write(&mut self, addr: u16, value: u8);

    fn read_ranges(&self) -> &'static [(u16, u16)] {
        &[]
    }

    fn read(&mut self, _addr: u16) -> u8 {
        0xFF
    }
}

pub fn create_ext(kind: ExtKind, timing: &Timing) -> Box<dyn SoundExt> {
    let mut ext: Box<dyn SoundExt> = match kind {
        ExtKind::Mmc5 => Box::new(Mmc5Sound::default()),
        ExtKind::Vrc6 => Box::new(Vrc6Sound::default()),
        ExtKind::Fds => Box::new(FdsSound::default()),
        ExtKind::Vrc7 => Box::new(Vrc7Sound::default()),
    };
    ext.reset(timing);
    ext
}

#[derive(Debug, Clone, Copy, Default)]
struct Mmc5Pulse {
    regs: [u8; 4],
    enabled: bool,
    accum: f32,
    freq: i32,
    output_vol: i32,
    fixed_envelope: bool,
    holdnote: bool,
    volume: u8,
    env_phase: i32,
    env_delay: i32,
    env_vol: u8,
    vbl_length: i32,
    adder: u8,
    duty_flip: u8,
}

impl Mmc5Pulse {
    fn process(&mut self, incsize: f32) -> i32 {
        decay_output(&mut self.output_vol);

        if !self.enabled || self.vbl_length == 0 {
            self.output_vol = 0;
            return 0;
        }

        if !self.holdnote {
            self.vbl_length -= 1;
        }

        self.env_phase -= 4;
        while self.env_phase < 0 {
            self.env_phase += self.env_delay;
            if self.holdnote {
                self.env_vol = (self.env_vol + 1) & 0x0F;
            } else if self.env_vol < 0x0F {
                self.env_vol += 1;
            }
        }

        if self.freq < 4 {
            return self.output_vol;
        }

        self.accum -= incsize;
        if self.accum >= 0.0 {
            return self.output_vol;
        }

        let output = if self.fixed_envelope {
            (self.volume as i32) << 8
        } else {
            ((self.env_vol ^ 0x0F) as i32) << 8
        };

        let mut total = 0;
        let mut times = 0;
        while self.accum < 0.0 {
            self.accum += self.freq as f32;
            self.adder = (self.adder + 1) & 0x0F;
            if self.adder < self.duty_flip {
                total += output;
            } else {
                total -= output;
            }
            times += 1;
        }

        self.output_vol = total / times;
        self.output_vol
    }
}

/// MMC5: two pulse channels without sweep, a raw 8-bit PCM register and the
/// 8x8 multiplier at $5205/$5206.
#[derive(Debug, Clone, Default)]
pub struct Mmc5Sound {
    incsize: f32,
    decay: [i32; 16],
    vbl: [i32; 32],
    mul: [u8; 2],
    pulse: [Mmc5Pulse; 2],
    dac_output: i32,
    dac_enabled: bool,
}

impl SoundExt for Mmc5Sound {
    fn kind(&self) -> ExtKind {
        ExtKind::Mmc5
    }

    fn reset(&mut self, timing: &Timing) {
        self.incsize = timing.cycle_rate;
        self.decay = timing.decay;
        self.vbl = timing.vbl;
        for addr in 0x5000..0x5008 {
            self.write(addr, 0);
        }
        self.write(0x5010, 0);
        self.write(0x5011, 0);
    }

    fn process(&mut self) -> i32 {
        let mut accum = self.pulse[0].process(self.incsize);
        accum += self.pulse[1].process(self.incsize);
        if self.dac_enabled {
            accum += self.dac_output;
        }
        accum
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        &[(0x5000, 0x5015), (0x5114, 0x5115), (0x5205, 0x5206)]
    }

    fn write(&mut self, addr: u16, value: u8) {
        let chan = usize::from(addr & 4 != 0);
        match addr {
            0x5000 | 0x5004 => {
                let pulse = &mut self.pulse[chan];
                pulse.regs[0] = value;
                pulse.volume = value & 0x0F;
                pulse.env_delay = self.decay[(value & 0x0F) as usize];
                pulse.holdnote = value & 0x20 != 0;
                pulse.fixed_envelope = value & 0x10 != 0;
                pulse.duty_flip = DUTY_FLIP[(value >> 6) as usize];
            }
            0x5002 | 0x5006 => {
                let pulse = &mut self.pulse[chan];
                pulse.regs[2] = value;
                if pulse.enabled {
                    pulse.freq = (((pulse.regs[3] & 7) as i32) << 8) + value as i32 + 1;
                }
            }
            0x5003 | 0x5007 => {
                let pulse = &mut self.pulse[chan];
                pulse.regs[3] = value;
                if pulse.enabled {
                    pulse.vbl_length = self.vbl[(value >> 3) as usize];
                    pulse.env_vol = 0;
                    pulse.freq = (((value & 7) as i32) << 8) + pulse.regs[2] as i32 + 1;
                    pulse.adder = 0;
                }
            }
            0x5015 => {
                for (i, pulse) in self.pulse.iter_mut().enumerate() {
                    pulse.enabled = value & (1 << i) != 0;
                    if !pulse.enabled {
                        pulse.vbl_length = 0;
                    }
                }
            }
            0x5010 => self.dac_enabled = value & 0x01 != 0,
            0x5011 => self.dac_output = ((value ^ 0x80) as i32) << 8,
            0x5205 => self.mul[0] = value,
            0x5206 => self.mul[1] = value,
            _ => {}
        }
    }

    fn read_ranges(&self) -> &'static [(u16, u16)] {
        &[(0x5205, 0x5206)]
    }

    fn read(&mut self, addr: u16) -> u8 {
        let product = self.mul[0] as u16 * self.mul[1] as u16;
        match addr {
            0x5205 => product as u8,
            0x5206 => (product >> 8) as u8,
            _ => 0xFF,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Vrc6Pulse {
    regs: [u8; 3],
    enabled: bool,
    accum: f32,
    adder: u8,
    freq: i32,
    volume: i32,
    duty_flip: u8,
}

impl Vrc6Pulse {
    fn process(&mut self, incsize: f32) -> i32 {
        self.accum -= incsize;
        while self.accum < 0.0 {
            self.accum += self.freq as f32;
            self.adder = (self.adder + 1) & 0x0F;
        }

        if !self.enabled {
            0
        } else if self.adder < self.duty_flip {
            -self.volume
        } else {
            self.volume
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Vrc6Saw {
    regs: [u8; 3],
    enabled: bool,
    accum: f32,
    adder: u8,
    output_acc: u8,
    freq: i32,
    volume: u8,
}

impl Vrc6Saw {
    fn process(&mut self, incsize: f32) -> i32 {
        self.accum -= incsize;
        while self.accum < 0.0 {
            self.accum += self.freq as f32;
            self.output_acc = self.output_acc.wrapping_add(self.volume);
            self.adder += 1;
            if self.adder == 7 {
                self.adder = 0;
                self.output_acc = 0;
            }
        }

        if self.enabled {
            ((self.output_acc >> 3) as i32) << 9
        } else {
            0
        }
    }
}

/// VRC6: two 16-step pulse channels with 8 duty settings plus a sawtooth accumulator.
#[derive(Debug, Clone, Default)]
pub struct Vrc6Sound {
    incsize: f32,
    pulse: [Vrc6Pulse; 2],
    saw: Vrc6Saw,
}

impl SoundExt for Vrc6Sound {
    fn kind(&self) -> ExtKind {
        ExtKind::Vrc6
    }

    fn reset(&mut self, timing: &Timing) {
        self.incsize = timing.cycle_rate;
        for i in 0..3 {
            self.write(0x9000 + i, 0);
            self.write(0xA000 + i, 0);
            self.write(0xB000 + i, 0);
        }
    }

    fn process(&mut self) -> i32 {
        let mut output = self.pulse[0].process(self.incsize);
        output += self.pulse[1].process(self.incsize);
        output += self.saw.process(self.incsize);
        output
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        &[(0x9000, 0x9002), (0xA000, 0xA002), (0xB000, 0xB002)]
    }

    fn write(&mut self, addr: u16, value: u8) {
        let chan = ((addr >> 12) as usize).saturating_sub(9) & 1;
        match addr & 0xB003 {
            0x9000 | 0xA000 => {
                let pulse = &mut self.pulse[chan];
                pulse.regs[0] = value;
                pulse.volume = ((value & 0x0F) as i32) << 8;
                pulse.duty_flip = (value >> 4) + 1;
            }
            0x9001 | 0xA001 => {
                let pulse = &mut self.pulse[chan];
                pulse.regs[1] = value;
                pulse.freq = (((pulse.regs[2] & 0x0F) as i32) << 8) + value as i32 + 1;
            }
            0x9002 | 0xA002 => {
                let pulse = &mut self.pulse[chan];
                pulse.regs[2] = value;
                pulse.freq = (((value & 0x0F) as i32) << 8) + pulse.regs[1] as i32 + 1;
                pulse.enabled = value & 0x80 != 0;
            }
            0xB000 => {
                self.saw.regs[0] = value;
                self.saw.volume = value & 0x3F;
            }
            0xB001 => {
                self.saw.regs[1] = value;
                self.saw.freq = ((((self.saw.regs[2] & 0x0F) as i32) << 8) + value as i32 + 1) << 1;
            }
            0xB002 => {
                self.saw.regs[2] = value;
                self.saw.freq = ((((value & 0x0F) as i32) << 8) + self.saw.regs[1] as i32 + 1) << 1;
                self.saw.enabled = value & 0x80 != 0;
            }
            _ => {}
        }
    }
}

/// FDS wavetable registers. Writes are latched but no waveform is produced.
#[derive(Debug, Clone)]
pub struct FdsSound {
    regs: [u8; 0x53],
}

impl Default for FdsSound {
    fn default() -> Self {
        Self { regs: [0; 0x53] }
    }
}

impl FdsSound {
    #[cfg(test)]
    fn register(&self, addr: u16) -> u8 {
        self.regs
            .get(addr.wrapping_sub(0x4040) as usize)
            .copied()
            .unwrap_or(0)
    }
}

impl SoundExt for FdsSound {
    fn kind(&self) -> ExtKind {
        ExtKind::Fds
    }

    fn reset(&mut self, _timing: &Timing) {
        self.regs = [0; 0x53];
    }

    fn process(&mut self) -> i32 {
        0
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        &[(0x4040, 0x4092)]
    }

    fn write(&mut self, addr: u16, value: u8) {
        if let Some(reg) = self.regs.get_mut(addr.wrapping_sub(0x4040) as usize) {
            *reg = value;
        }
    }
}

/// VRC7 register port. FM synthesis is not emulated, so the channel stays silent.
#[derive(Debug, Clone)]
pub struct Vrc7Sound {
    select: u8,
    regs: [u8; 0x40],
}

impl Default for Vrc7Sound {
    fn default() -> Self {
        Self {
            select: 0,
            regs: [0; 0x40],
        }
    }
}

impl SoundExt for Vrc7Sound {
    fn kind(&self) -> ExtKind {
        ExtKind::Vrc7
    }

    fn reset(&mut self, _timing: &Timing) {
        self.select = 0;
        self.regs = [0; 0x40];
    }

    fn process(&mut self) -> i32 {
        0
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        &[(0x9010, 0x9010), (0x9030, 0x9030)]
    }

    fn write(&mut self, addr: u16, value: u8) {
        if addr == 0x9010 {
            self.select = value & 0x3F;
        } else {
            self.regs[self.select as usize] = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing() -> Timing {
        Timing::new(44_100, 60)
    }

    #[test]
    fn mmc5_multiplier_reads_back_product() {
        let mut ext = create_ext(ExtKind::Mmc5, &timing());
        ext.write(0x5205, 0x34);
        ext.write(0x5206, 0x12);
        let product = 0x34u16 * 0x12;
        assert_eq!(ext.read(0x5205), product as u8);
        assert_eq!(ext.read(0x5206), (product >> 8) as u8);
    }

    #[test]
    fn mmc5_raw_pcm_only_mixes_when_enabled() {
        let mut ext = create_ext(ExtKind::Mmc5, &timing());
        ext.write(0x5011, 0xC0);
        assert_eq!(ext.process(), 0);
        ext.write(0x5010, 0x01);
        assert_eq!(ext.process(), 0x40 << 8);
    }

    #[test]
    fn mmc5_pulse_ignores_length_writes_while_disabled() {
        let mut ext = Mmc5Sound::default();
        ext.reset(&timing());
        ext.write(0x5003, 0x08);
        assert_eq!(ext.pulse[0].vbl_length, 0);
        ext.write(0x5015, 0x01);
        ext.write(0x5000, 0x1F);
        ext.write(0x5002, 0x80);
        ext.write(0x5003, 0x08);
        assert!(ext.pulse[0].vbl_length > 0);
        let heard = (0..64).any(|_| ext.process() != 0);
        assert!(heard);
    }

    #[test]
    fn vrc6_sawtooth_climbs_then_resets() {
        let mut ext = Vrc6Sound::default();
        ext.reset(&timing());
        ext.write(0xB000, 0x3F);
        ext.write(0xB001, 0x10);
        ext.write(0xB002, 0x80);
        let samples: Vec<i32> = (0..32).map(|_| ext.process()).collect();
        assert!(samples.iter().any(|&s| s > 0));
        assert!(samples.iter().all(|&s| s >= 0));
    }

    #[test]
    fn vrc6_pulse_swings_around_zero() {
        let mut ext = create_ext(ExtKind::Vrc6, &timing());
        ext.write(0x9000, 0x7F);
        ext.write(0x9001, 0x20);
        ext.write(0x9002, 0x80);
        let samples: Vec<i32> = (0..64).map(|_| ext.process()).collect();
        assert!(samples.contains(&(15 << 8)));
        assert!(samples.contains(&-(15 << 8)));
    }

    #[test]
    fn fds_latches_registers_silently() {
        let mut ext = FdsSound::default();
        ext.write(0x4080, 0x55);
        assert_eq!(ext.register(0x4080), 0x55);
        assert_eq!(ext.process(), 0);
    }

    #[test]
    fn vrc7_claims_only_its_register_ports() {
        let mut ext = create_ext(ExtKind::Vrc7, &timing());
        assert_eq!(ext.write_ranges(), &[(0x9010, 0x9010), (0x9030, 0x9030)]);
        ext.write(0x9010, 0x10);
        ext.write(0x9030, 0xFF);
        assert_eq!(ext.process(), 0);
        assert_eq!(ext.kind().name(), "VRC7");
    }
}
