pub mod ext;

use serde::{Deserialize, Serialize};

use self::ext::{ExtKind, SoundExt, create_ext};
use super::cartridge::Rom;
use super::cpu::Cpu;

pub const CPU_CLOCK_HZ: f64 = 1_789_772.727_272_727_3;

pub const SOUND_REGS_LEN: usize = 0x16;

/// Channel bits for `Apu::set_channel` and the config mix mask.
pub const CHAN_PULSE1: u8 = 0x01;
pub const CHAN_PULSE2: u8 = 0x02;
pub const CHAN_TRIANGLE: u8 = 0x04;
pub const CHAN_NOISE: u8 = 0x08;
pub const CHAN_DMC: u8 = 0x10;
pub const CHAN_EXT: u8 = 0x20;
pub const CHAN_ALL: u8 = 0x3F;

/// Note lengths in frames, indexed by the top five bits of the length register.
const LENGTH_TABLE: [i32; 32] = [
    5, 127, 10, 1, 19, 2, 40, 3, 80, 4, 30, 5, 7, 6, 13, 7, 6, 8, 12, 9, 24, 10, 48, 11, 96, 12,
    36, 13, 8, 14, 16, 15,
];

/// Highest timer value a pulse reaches before an up-sweep would overflow, per shift count.
const FREQ_LIMIT: [i32; 8] = [0x3FF, 0x555, 0x666, 0x71C, 0x787, 0x7C1, 0x7E0, 0x7F0];

const NOISE_PERIOD_TABLE: [i32; 16] = [
    4, 8, 16, 32, 64, 96, 128, 160, 202, 254, 380, 508, 762, 1016, 2034, 4068,
];

const DMC_RATE_TABLE: [i32; 16] = [
    428, 380, 340, 320, 286, 254, 226, 214, 190, 160, 142, 128, 106, 85, 72, 54,
];

/// Steps out of 16 a pulse spends high, per duty setting.
pub(crate) const DUTY_FLIP: [u8; 4] = [2, 4, 8, 12];

const NOISE_LONG_LEN: usize = 0x7FFF;
const NOISE_SHORT_LEN: usize = 93;

/// Post-mix smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
    None,
    Lowpass,
    #[default]
    Weighted,
}

/// Per-sample timing derived from the output rate. Envelope, sweep and length units
/// are all counted in output samples.
#[derive(Debug, Clone)]
pub struct Timing {
    pub sample_rate: u32,
    pub refresh_rate: u32,
    pub num_samples: i32,
    /// CPU cycles per output sample.
    pub cycle_rate: f32,
    pub decay: [i32; 16],
    pub vbl: [i32; 32],
    pub trilength: [i32; 128],
}

impl Timing {
    pub fn new(sample_rate: u32, refresh_rate: u32) -> Self {
        let sample_rate = sample_rate.max(1);
        let refresh_rate = refresh_rate.max(1);
        let num_samples = (sample_rate / refresh_rate) as i32;

        let mut decay = [0; 16];
        for (i, entry) in decay.iter_mut().enumerate() {
            *entry = num_samples * (i as i32 + 1);
        }
        let mut vbl = [0; 32];
        for (entry, length) in vbl.iter_mut().zip(LENGTH_TABLE) {
            *entry = length * num_samples;
        }
        let mut trilength = [0; 128];
        for (i, entry) in trilength.iter_mut().enumerate() {
            *entry = (0.25 * i as f64 * num_samples as f64) as i32;
        }

        Self {
            sample_rate,
            refresh_rate,
            num_samples,
            cycle_rate: (CPU_CLOCK_HZ / sample_rate as f64) as f32,
            decay,
            vbl,
            trilength,
        }
    }
}

pub(crate) fn decay_output(value: &mut i32) {
    *value -= *value >> 7;
}

/// A mixed sample format the APU can emit.
pub trait AudioSample: Copy {
    fn from_mix(sample: i32) -> Self;
}

impl AudioSample for i16 {
    fn from_mix(sample: i32) -> Self {
        sample as i16
    }
}

impl AudioSample for u8 {
    fn from_mix(sample: i32) -> Self {
        ((sample >> 8) as u8) ^ 0x80
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PulseChannel {
    regs: [u8; 4],
    enabled: bool,
    accum: f32,
    freq: i32,
    output_vol: i32,
    fixed_envelope: bool,
    holdnote: bool,
    volume: u8,
    sweep_phase: i32,
    sweep_delay: i32,
    sweep_on: bool,
    sweep_shifts: u8,
    sweep_inc: bool,
    freq_limit: i32,
    env_phase: i32,
    env_delay: i32,
    env_vol: u8,
    vbl_length: i32,
    adder: u8,
    duty_flip: u8,
    /// The first pulse's sweep subtracts one extra.
    ones_complement: bool,
}

impl PulseChannel {
    fn new(ones_complement: bool) -> Self {
        Self {
            ones_complement,
            ..Self::default()
        }
    }

    fn write_control(&mut self, value: u8, timing: &Timing) {
        self.regs[0] = value;
        self.volume = value & 0x0F;
        self.env_delay = timing.decay[(value & 0x0F) as usize];
        self.holdnote = value & 0x20 != 0;
        self.fixed_envelope = value & 0x10 != 0;
        self.duty_flip = DUTY_FLIP[(value >> 6) as usize];
    }

    fn write_sweep(&mut self, value: u8, timing: &Timing) {
        self.regs[1] = value;
        self.sweep_on = value & 0x80 != 0;
        self.sweep_shifts = value & 7;
        self.sweep_delay = timing.decay[((value >> 4) & 7) as usize];
        self.sweep_inc = value & 0x08 != 0;
        self.freq_limit = FREQ_LIMIT[(value & 7) as usize];
    }

    fn write_timer_low(&mut self, value: u8) {
        self.regs[2] = value;
        self.freq = (self.freq & !0xFF) | value as i32;
    }

    fn write_timer_high(&mut self, value: u8, timing: &Timing) {
        self.regs[3] = value;
        self.vbl_length = timing.vbl[(value >> 3) as usize];
        self.env_vol = 0;
        self.freq = (((value & 7) as i32) << 8) | (self.freq & 0xFF);
        self.adder = 0;
    }

    fn clock_envelope(&mut self) {
        self.env_phase -= 4;
        while self.env_phase < 0 {
            self.env_phase += self.env_delay;
            if self.holdnote {
                self.env_vol = (self.env_vol + 1) & 0x0F;
            } else if self.env_vol < 0x0F {
                self.env_vol += 1;
            }
        }
    }

    fn clock_sweep(&mut self) {
        if !self.sweep_on || self.sweep_shifts == 0 {
            return;
        }
        self.sweep_phase -= 2;
        while self.sweep_phase < 0 {
            self.sweep_phase += self.sweep_delay;
            let delta = self.freq >> self.sweep_shifts;
            if self.sweep_inc {
                self.freq -= delta + i32::from(self.ones_complement);
            } else {
                self.freq += delta;
            }
        }
    }

    fn output(&mut self, cycle_rate: f32) -> i32 {
        decay_output(&mut self.output_vol);

        if !self.enabled || self.vbl_length == 0 {
            self.output_vol = 0;
            return 0;
        }

        if !self.holdnote {
            self.vbl_length -= 1;
        }

        self.clock_envelope();

        if self.freq < 8 || (!self.sweep_inc && self.freq > self.freq_limit) {
            return self.output_vol;
        }

        self.clock_sweep();

        self.accum -= cycle_rate;
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
            self.accum += (self.freq + 1) as f32;
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

#[derive(Debug, Clone, Copy, Default)]
struct TriangleChannel {
    regs: [u8; 3],
    enabled: bool,
    accum: f32,
    freq: i32,
    output_vol: i32,
    adder: u8,
    holdnote: bool,
    counter_started: bool,
    write_latency: i32,
    vbl_length: i32,
    linear_length: i32,
}

impl TriangleChannel {
    fn write_linear(&mut self, value: u8, timing: &Timing) {
        self.regs[0] = value;
        self.holdnote = value & 0x80 != 0;
        if !self.counter_started && self.vbl_length != 0 {
            self.linear_length = timing.trilength[(value & 0x7F) as usize];
        }
    }

    fn write_timer_low(&mut self, value: u8) {
        self.regs[1] = value;
        self.freq = (((self.regs[2] & 7) as i32) << 8) + value as i32 + 1;
    }

    /// Arms the length counter after roughly 228 CPU cycles, so a game that writes the
    /// timer before the linear register does not start the count early.
    fn write_timer_high(&mut self, value: u8, timing: &Timing) {
        self.regs[2] = value;
        self.write_latency = (228.0 / timing.cycle_rate) as i32;
        self.freq = (((value & 7) as i32) << 8) + self.regs[1] as i32 + 1;
        self.vbl_length = timing.vbl[(value >> 3) as usize];
        self.counter_started = false;
        self.linear_length = timing.trilength[(self.regs[0] & 0x7F) as usize];
    }

    fn scaled(&self) -> i32 {
        self.output_vol + (self.output_vol >> 2)
    }

    fn output(&mut self, cycle_rate: f32) -> i32 {
        decay_output(&mut self.output_vol);

        if !self.enabled || self.vbl_length == 0 {
            self.output_vol = 0;
            return 0;
        }

        if self.counter_started {
            if self.linear_length > 0 {
                self.linear_length -= 1;
            }
            if self.vbl_length != 0 && !self.holdnote {
                self.vbl_length -= 1;
            }
        } else if !self.holdnote && self.write_latency != 0 {
            self.write_latency -= 1;
            if self.write_latency == 0 {
                self.counter_started = true;
            }
        }

        if self.linear_length == 0 || self.freq < 4 {
            return self.scaled();
        }

        self.accum -= cycle_rate;
        while self.accum < 0.0 {
            self.accum += self.freq as f32;
            self.adder = (self.adder + 1) & 0x1F;
            if self.adder & 0x10 != 0 {
                self.output_vol -= 2 << 8;
            } else {
                self.output_vol += 2 << 8;
            }
        }

        self.scaled()
    }
}

#[derive(Debug, Clone, Default)]
struct NoiseChannel {
    regs: [u8; 3],
    enabled: bool,
    accum: f32,
    freq: i32,
    output_vol: i32,
    env_phase: i32,
    env_delay: i32,
    env_vol: u8,
    fixed_envelope: bool,
    holdnote: bool,
    volume: u8,
    vbl_length: i32,
    short_sample: bool,
    cur_pos: usize,
}

impl NoiseChannel {
    fn write_control(&mut self, value: u8, timing: &Timing) {
        self.regs[0] = value;
        self.env_delay = timing.decay[(value & 0x0F) as usize];
        self.holdnote = value & 0x20 != 0;
        self.fixed_envelope = value & 0x10 != 0;
        self.volume = value & 0x0F;
    }

    fn write_length(&mut self, value: u8, timing: &Timing) {
        self.regs[2] = value;
        self.vbl_length = timing.vbl[(value >> 3) as usize];
        self.env_vol = 0;
    }

    fn scaled(&self) -> i32 {
        (self.output_vol * 3) >> 2
    }

    fn output(&mut self, cycle_rate: f32, lfsr: &NoiseTables) -> i32 {
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

        self.accum -= cycle_rate;
        if self.accum >= 0.0 {
            return self.scaled();
        }

        let outvol = if self.fixed_envelope {
            (self.volume as i32) << 8
        } else {
            ((self.env_vol ^ 0x0F) as i32) << 8
        };

        let table: &[u8] = if self.short_sample {
            &lfsr.short
        } else {
            &lfsr.long
        };

        let mut total = 0;
        let mut times = 0;
        while self.accum < 0.0 {
            self.accum += self.freq as f32;
            self.cur_pos += 1;
            if self.cur_pos >= table.len() {
                self.cur_pos = 0;
            }
            if table[self.cur_pos] != 0 {
                total += outvol;
            } else {
                total -= outvol;
            }
            times += 1;
        }

        self.output_vol = total / times;
        self.scaled()
    }
}

/// Precomputed 15-bit LFSR output for both noise modes.
#[derive(Debug, Clone)]
struct NoiseTables {
    sreg: u32,
    long: Vec<u8>,
    short: Vec<u8>,
}

impl NoiseTables {
    fn new() -> Self {
        let mut tables = Self {
            sreg: 0x4000,
            long: vec![0; NOISE_LONG_LEN],
            short: vec![0; NOISE_SHORT_LEN],
        };
        tables.fill_long();
        tables.fill_short();
        tables
    }

    fn step(&mut self, tap: u32) -> u8 {
        let bit0 = self.sreg & 1;
        let bit14 = bit0 ^ ((self.sreg >> tap) & 1);
        self.sreg = (self.sreg >> 1) | (bit14 << 14);
        (bit0 ^ 1) as u8
    }

    fn fill_long(&mut self) {
        for i in 0..NOISE_LONG_LEN {
            self.long[i] = self.step(1);
        }
    }

    fn fill_short(&mut self) {
        for i in 0..NOISE_SHORT_LEN {
            self.short[i] = self.step(6);
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct DmcChannel {
    regs: [u8; 4],
    enabled: bool,
    accum: f32,
    freq: i32,
    output_vol: i32,
    address: u16,
    cached_addr: u16,
    dma_length: i32,
    cached_dmalength: i32,
    cur_byte: u8,
    looping: bool,
    irq_gen: bool,
    irq_occurred: bool,
}

impl DmcChannel {
    fn write_control(&mut self, value: u8) {
        self.regs[0] = value;
        self.freq = DMC_RATE_TABLE[(value & 0x0F) as usize];
        self.looping = value & 0x40 != 0;
        self.irq_gen = value & 0x80 != 0;
        if !self.irq_gen {
            self.irq_occurred = false;
        }
    }

    /// Direct DAC load: the output jumps by the difference from the current level.
    fn write_output_level(&mut self, value: u8) {
        let value = value & 0x7F;
        self.output_vol += (value as i32 - self.regs[1] as i32) << 8;
        self.regs[1] = value;
    }

    fn write_sample_addr(&mut self, value: u8) {
        self.regs[2] = value;
        self.cached_addr = 0xC000 + ((value as u16) << 6);
    }

    fn write_sample_length(&mut self, value: u8) {
        self.regs[3] = value;
        self.cached_dmalength = (((value as i32) << 4) + 1) << 3;
    }

    fn restart_sample(&mut self) {
        self.address = self.cached_addr;
        self.dma_length = self.cached_dmalength;
        self.irq_occurred = false;
    }

    fn scaled(&self) -> i32 {
        (self.output_vol * 3) >> 2
    }

    /// Each fetched byte is read straight from the CPU page table and costs the CPU
    /// one cycle.
    fn output(&mut self, cycle_rate: f32, cpu: &mut Cpu, rom: &Rom) -> i32 {
        decay_output(&mut self.output_vol);

        if self.dma_length == 0 {
            return self.scaled();
        }

        self.accum -= cycle_rate;
        while self.accum < 0.0 {
            self.accum += self.freq as f32;

            let delta_bit = (self.dma_length & 7) ^ 7;
            if delta_bit == 7 {
                self.cur_byte = cpu.read_page(rom, self.address);
                cpu.burn(1);
                self.address = if self.address == 0xFFFF {
                    0x8000
                } else {
                    self.address + 1
                };
            }

            self.dma_length -= 1;
            if self.dma_length == 0 {
                if self.looping {
                    self.restart_sample();
                } else {
                    if self.irq_gen {
                        self.irq_occurred = true;
                        cpu.irq(rom);
                    }
                    self.enabled = false;
                    break;
                }
            }

            if self.cur_byte & (1 << delta_bit) != 0 {
                if self.regs[1] < 0x7D {
                    self.regs[1] += 2;
                    self.output_vol += 2 << 8;
                }
            } else if self.regs[1] > 1 {
                self.regs[1] -= 2;
                self.output_vol -= 2 << 8;
            }
        }

        self.scaled()
    }
}

/// Five built-in channels plus an optional cartridge expansion, synthesised one
/// frame's worth of samples at a time.
pub struct Apu {
    pulse: [PulseChannel; 2],
    triangle: TriangleChannel,
    noise: NoiseChannel,
    dmc: DmcChannel,
    enable_reg: u8,

    mix_enable: u8,
    filter: Filter,
    prev_sample: i32,
    timing: Timing,
    noise_tables: NoiseTables,
    ext: Option<Box<dyn SoundExt>>,
}

impl Apu {
    pub fn new(sample_rate: u32, refresh_rate: u32) -> Self {
        let mut apu = Self {
            pulse: [PulseChannel::new(true), PulseChannel::new(false)],
            triangle: TriangleChannel::default(),
            noise: NoiseChannel::default(),
            dmc: DmcChannel::default(),
            enable_reg: 0,
            mix_enable: CHAN_ALL,
            filter: Filter::default(),
            prev_sample: 0,
            timing: Timing::new(sample_rate, refresh_rate),
            noise_tables: NoiseTables::new(),
            ext: None,
        };
        apu.reset();
        apu
    }

    /// Rebuilds the per-sample tables for a new output rate, then resets.
    pub fn set_params(&mut self, sample_rate: u32, refresh_rate: u32) {
        self.timing = Timing::new(sample_rate, refresh_rate);
        self.reset();
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Samples one frame needs at the configured rates.
    pub fn samples_per_frame(&self) -> usize {
        self.timing.num_samples as usize
    }

    pub fn reset(&mut self) {
        for addr in 0x4000..=0x4013 {
            self.write_register(addr, 0);
        }
        self.write_register(0x4015, 0);
        if let Some(ext) = self.ext.as_mut() {
            ext.reset(&self.timing);
        }
    }

    pub fn set_filter(&mut self, filter: Filter) {
        self.filter = filter;
    }

    pub fn set_channel(&mut self, chan: u8, enabled: bool) {
        if enabled {
            self.mix_enable |= chan;
        } else {
            self.mix_enable &= !chan;
        }
    }

    pub fn set_mix_mask(&mut self, mask: u8) {
        self.mix_enable = mask & CHAN_ALL;
    }

    pub fn set_ext(&mut self, kind: Option<ExtKind>) {
        self.ext = kind.map(|kind| create_ext(kind, &self.timing));
    }

    pub fn ext_kind(&self) -> Option<ExtKind> {
        self.ext.as_ref().map(|ext| ext.kind())
    }

    pub(crate) fn ext_mut(&mut self) -> Option<&mut (dyn SoundExt + 'static)> {
        self.ext.as_deref_mut()
    }

    /// CPU writes to $4000-$4013 and $4015.
    pub fn write_register(&mut self, addr: u16, value: u8) {
        let timing = &self.timing;
        match addr {
            0x4000 | 0x4004 => self.pulse[((addr >> 2) & 1) as usize].write_control(value, timing),
            0x4001 | 0x4005 => self.pulse[((addr >> 2) & 1) as usize].write_sweep(value, timing),
            0x4002 | 0x4006 => self.pulse[((addr >> 2) & 1) as usize].write_timer_low(value),
            0x4003 | 0x4007 => {
                self.pulse[((addr >> 2) & 1) as usize].write_timer_high(value, timing)
            }
            0x4008 => self.triangle.write_linear(value, timing),
            0x400A => self.triangle.write_timer_low(value),
            0x400B => self.triangle.write_timer_high(value, timing),
            0x400C => self.noise.write_control(value, timing),
            0x400E => {
                self.noise.regs[1] = value;
                self.noise.freq = NOISE_PERIOD_TABLE[(value & 0x0F) as usize];
                let short = value & 0x80 != 0;
                if short && !self.noise.short_sample {
                    self.noise_tables.fill_short();
                    self.noise.cur_pos = 0;
                }
                self.noise.short_sample = short;
            }
            0x400F => self.noise.write_length(value, timing),
            0x4010 => self.dmc.write_control(value),
            0x4011 => self.dmc.write_output_level(value),
            0x4012 => self.dmc.write_sample_addr(value),
            0x4013 => self.dmc.write_sample_length(value),
            0x4015 => self.write_status(value),
            _ => {}
        }
    }

    fn write_status(&mut self, value: u8) {
        self.enable_reg = value;
        self.dmc.enabled = value & 0x10 != 0;

        for (i, pulse) in self.pulse.iter_mut().enumerate() {
            pulse.enabled = value & (1 << i) != 0;
            if !pulse.enabled {
                pulse.vbl_length = 0;
            }
        }

        self.triangle.enabled = value & 0x04 != 0;
        if !self.triangle.enabled {
            self.triangle.vbl_length = 0;
            self.triangle.linear_length = 0;
            self.triangle.counter_started = false;
            self.triangle.write_latency = 0;
        }

        self.noise.enabled = value & 0x08 != 0;
        if !self.noise.enabled {
            self.noise.vbl_length = 0;
        }

        if self.dmc.enabled {
            if self.dmc.dma_length == 0 {
                self.dmc.restart_sample();
            }
        } else {
            self.dmc.dma_length = 0;
        }
        self.dmc.irq_occurred = false;
    }

    /// $4015 channel status. Other addresses in $4000-$4014 read back the high
    /// address byte left on the bus.
    pub fn read_register(&self, addr: u16) -> u8 {
        if addr != 0x4015 {
            return (addr >> 8) as u8;
        }

        let mut value = 0;
        for (i, pulse) in self.pulse.iter().enumerate() {
            if pulse.enabled && pulse.vbl_length != 0 {
                value |= 1 << i;
            }
        }
        if self.triangle.enabled && self.triangle.vbl_length != 0 {
            value |= 0x04;
        }
        if self.noise.enabled && self.noise.vbl_length != 0 {
            value |= 0x08;
        }
        if self.dmc.enabled {
            value |= 0x10;
        }
        if self.dmc.irq_occurred {
            value |= 0x80;
        }
        value
    }

    fn mix_sample(&mut self, cpu: &mut Cpu, rom: &Rom) -> i32 {
        let rate = self.timing.cycle_rate;
        let mut accum = 0;
        if self.mix_enable & CHAN_PULSE1 != 0 {
            accum += self.pulse[0].output(rate);
        }
        if self.mix_enable & CHAN_PULSE2 != 0 {
            accum += self.pulse[1].output(rate);
        }
        if self.mix_enable & CHAN_TRIANGLE != 0 {
            accum += self.triangle.output(rate);
        }
        if self.mix_enable & CHAN_NOISE != 0 {
            accum += self.noise.output(rate, &self.noise_tables);
        }
        if self.mix_enable & CHAN_DMC != 0 {
            accum += self.dmc.output(rate, cpu, rom);
        }
        if self.mix_enable & CHAN_EXT != 0 {
            if let Some(ext) = self.ext.as_mut() {
                accum += ext.process();
            }
        }

        if self.filter != Filter::None {
            let next = accum;
            accum = match self.filter {
                Filter::Lowpass => (accum + self.prev_sample) >> 1,
                _ => (accum * 3 + self.prev_sample) >> 2,
            };
            self.prev_sample = next;
        }

        accum.clamp(-0x8000, 0x7FFF)
    }

    /// Fills `out` with mixed samples, one per element.
    pub fn process<S: AudioSample>(&mut self, cpu: &mut Cpu, rom: &Rom, out: &mut [S]) {
        for sample in out.iter_mut() {
            *sample = S::from_mix(self.mix_sample(cpu, rom));
        }
    }

    /// Raw register image for the `SOUN` save-state block.
    pub fn registers(&self) -> [u8; SOUND_REGS_LEN] {
        let mut regs = [0; SOUND_REGS_LEN];
        regs[0x00..0x04].copy_from_slice(&self.pulse[0].regs);
        regs[0x04..0x08].copy_from_slice(&self.pulse[1].regs);
        regs[0x08] = self.triangle.regs[0];
        regs[0x0A] = self.triangle.regs[1];
        regs[0x0B] = self.triangle.regs[2];
        regs[0x0C] = self.noise.regs[0];
        regs[0x0E] = self.noise.regs[1];
        regs[0x0F] = self.noise.regs[2];
        regs[0x10..0x14].copy_from_slice(&self.dmc.regs);
        regs[0x15] = self.enable_reg;
        regs
    }

    /// Replays a `SOUN` register image through the register write path.
    pub fn load_registers(&mut self, regs: &[u8; SOUND_REGS_LEN]) {
        for (i, &value) in regs.iter().enumerate().take(0x14) {
            self.write_register(0x4000 + i as u16, value);
        }
        self.write_register(0x4015, regs[0x15]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nes::cartridge::tests::make_rom;

    fn harness() -> (Apu, Cpu, Rom) {
        let mut apu = Apu::new(44_100, 60);
        apu.set_filter(Filter::None);
        (apu, Cpu::new(), make_rom(0, 2, 1))
    }

    fn play_pulse(apu: &mut Apu) {
        apu.write_register(0x4015, 0x01);
        apu.write_register(0x4000, 0xBF);
        apu.write_register(0x4002, 0x40);
        apu.write_register(0x4003, 0x08);
    }

    #[test]
    fn disabling_a_channel_silences_it_on_the_next_sample() {
        let (mut apu, mut cpu, rom) = harness();
        apu.set_mix_mask(CHAN_PULSE1);
        play_pulse(&mut apu);
        let mut out = [0i16; 32];
        apu.process(&mut cpu, &rom, &mut out);
        assert!(out.iter().any(|&s| s != 0));
        assert_eq!(apu.read_register(0x4015) & 0x01, 0x01);

        apu.write_register(0x4015, 0x00);
        let mut after = [1i16; 1];
        apu.process(&mut cpu, &rom, &mut after);
        assert_eq!(after[0], 0);
        assert_eq!(apu.read_register(0x4015) & 0x01, 0);
    }

    #[test]
    fn length_counter_runs_out_after_its_frames() {
        let (mut apu, mut cpu, rom) = harness();
        apu.set_mix_mask(CHAN_PULSE1);
        play_pulse(&mut apu);
        apu.write_register(0x4000, 0x9F);
        apu.write_register(0x4003, 0x00);
        let frames = LENGTH_TABLE[0] as usize;
        let mut out = vec![0i16; apu.samples_per_frame() * frames];
        apu.process(&mut cpu, &rom, &mut out);
        assert_eq!(apu.read_register(0x4015) & 0x01, 0);
    }

    #[test]
    fn output_formats_share_the_same_mix() {
        assert_eq!(i16::from_mix(0x1234), 0x1234);
        assert_eq!(u8::from_mix(0), 0x80);
        assert_eq!(u8::from_mix(-0x8000), 0x00);
        assert_eq!(u8::from_mix(0x7FFF), 0xFF);
    }

    #[test]
    fn dac_level_reaches_the_mix_unfiltered() {
        let (mut apu, mut cpu, rom) = harness();
        apu.set_ext(Some(ExtKind::Mmc5));
        apu.set_mix_mask(CHAN_EXT);
        if let Some(ext) = apu.ext_mut() {
            ext.write(0x5010, 1);
            ext.write(0x5011, 0xFF);
        }
        let mut out = [0i16; 2];
        apu.process(&mut cpu, &rom, &mut out);
        assert_eq!(out, [0x7F00, 0x7F00]);
    }

    #[test]
    fn lowpass_averages_with_previous_sample() {
        let (mut apu, mut cpu, rom) = harness();
        apu.set_ext(Some(ExtKind::Mmc5));
        apu.set_mix_mask(CHAN_EXT);
        apu.set_filter(Filter::Lowpass);
        if let Some(ext) = apu.ext_mut() {
            ext.write(0x5010, 1);
            ext.write(0x5011, 0xC0);
        }
        let mut out = [0i16; 2];
        apu.process(&mut cpu, &rom, &mut out);
        assert_eq!(out, [0x2000, 0x4000]);
    }

    #[test]
    fn dmc_steals_cycles_and_raises_irq_at_end() {
        let (mut apu, mut cpu, rom) = harness();
        cpu.pages[12] = crate::nes::bank::Page::new(crate::nes::bank::Region::Prg, 0);
        cpu.p &= !crate::nes::FLAG_INTERRUPT;
        apu.set_mix_mask(CHAN_DMC);
        apu.write_register(0x4010, 0x8F);
        apu.write_register(0x4012, 0x00);
        apu.write_register(0x4013, 0x00);
        apu.write_register(0x4015, 0x10);
        assert_eq!(apu.read_register(0x4015) & 0x10, 0x10);

        let mut out = [0i16; 64];
        apu.process(&mut cpu, &rom, &mut out);
        assert_eq!(cpu.burn_cycles, 1 + crate::nes::cpu::INT_CYCLES);
        assert_eq!(apu.read_register(0x4015) & 0x90, 0x80);

        apu.write_register(0x4015, 0x00);
        assert_eq!(apu.read_register(0x4015) & 0x80, 0);
    }

    #[test]
    fn triangle_waits_out_write_latency() {
        let (mut apu, mut cpu, rom) = harness();
        apu.set_mix_mask(CHAN_TRIANGLE);
        apu.write_register(0x4015, 0x04);
        apu.write_register(0x4008, 0x7F);
        apu.write_register(0x400A, 0x40);
        apu.write_register(0x400B, 0x08);
        assert!(!apu.triangle.counter_started);
        let latency = apu.triangle.write_latency as usize;
        assert!(latency > 0);
        let mut out = vec![0i16; latency];
        apu.process(&mut cpu, &rom, &mut out);
        assert!(apu.triangle.counter_started);
    }

    #[test]
    fn register_snapshot_replays() {
        let (mut apu, _, _) = harness();
        play_pulse(&mut apu);
        apu.write_register(0x4011, 0x20);
        apu.write_register(0x400E, 0x85);
        let regs = apu.registers();
        assert_eq!(regs[0x00], 0xBF);
        assert_eq!(regs[0x11], 0x20);
        assert_eq!(regs[0x15], 0x01);

        let (mut other, _, _) = harness();
        other.load_registers(&regs);
        assert_eq!(other.registers(), regs);
        assert_eq!(other.read_register(0x4015) & 0x01, 0x01);
    }

    #[test]
    fn unmapped_reads_return_bus_capacitance() {
        let (apu, _, _) = harness();
        assert_eq!(apu.read_register(0x4009), 0x40);
    }
}
