pub mod apu;
pub mod bank;
pub mod cartridge;
pub mod cpu;
pub mod input;
pub mod mapper;
pub mod ppu;
mod state;

use anyhow::{Result, bail};
use std::collections::VecDeque;

use apu::{Apu, AudioSample};
use bank::{CPU_PAGE_SIZE, Page, Region};
use cartridge::{Rom, SRAM_SIZE};
use cpu::Cpu;
use input::{DEV_JOYPAD0, DEV_JOYPAD1, DEV_ZAPPER, Input};
use mapper::{Mapper, MapperCtx, create_mapper, mapper_name, set_default_pages};
use ppu::{OAM_SIZE, Ppu};

pub use state::SNSS_MAGIC;

pub(crate) const FLAG_CARRY: u8 = 0x01;
pub(crate) const FLAG_ZERO: u8 = 0x02;
pub(crate) const FLAG_INTERRUPT: u8 = 0x04;
pub(crate) const FLAG_DECIMAL: u8 = 0x08;
pub(crate) const FLAG_BREAK: u8 = 0x10;
pub(crate) const FLAG_UNUSED: u8 = 0x20;
pub(crate) const FLAG_OVERFLOW: u8 = 0x40;
pub(crate) const FLAG_NEGATIVE: u8 = 0x80;

pub const MAX_EVENTS: usize = 512;

const MASTER_CLOCK: f64 = 236_250_000.0 / 11.0;
const CLOCK_DIVIDER: f64 = 12.0;
const SCANLINE_CYCLES: f32 = (1364.0 / CLOCK_DIVIDER) as f32;
const FIQ_PERIOD: i32 = (MASTER_CLOCK / CLOCK_DIVIDER / 60.0) as i32;

pub const SCANLINES_PER_FRAME: i32 = 262;
const VBLANK_LINE: i32 = 241;
const NMI_DELAY_CYCLES: i32 = 7;
const OAM_DMA_CYCLES: i32 = 513;
const DEFAULT_SEED: u32 = 0x2A5F_1C3D;

pub(crate) fn push_event<S: Into<String>>(events: &mut VecDeque<String>, event: S) {
    if events.len() >= MAX_EVENTS {
        events.pop_front();
    }
    events.push_back(event.into());
}

fn in_ranges(ranges: &[(u16, u16)], addr: u16) -> bool {
    ranges.iter().any(|&(lo, hi)| (lo..=hi).contains(&addr))
}

/// Deterministic garbage for power-on RAM contents.
#[derive(Debug, Clone)]
pub struct Prng {
    state: u32,
}

impl Prng {
    pub fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { DEFAULT_SEED } else { seed },
        }
    }

    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    pub fn fill(&mut self, buf: &mut [u8]) {
        for byte in buf.iter_mut() {
            *byte = (self.next_u32() >> 24) as u8;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetKind {
    Soft,
    Hard,
}

pub struct Nes {
    pub(crate) cpu: Cpu,
    pub(crate) ppu: Ppu,
    pub(crate) apu: Apu,
    pub(crate) rom: Rom,
    pub(crate) mapper: Option<Box<dyn Mapper>>,
    pub(crate) input: Input,

    pub(crate) scanline: i32,
    scanline_cycles: f32,
    fiq_state: u8,
    fiq_cycles: i32,
    fiq_occurred: bool,
    paused: bool,
    frame_count: u64,
    prng: Prng,
    debug_events: VecDeque<String>,
}

impl Default for Nes {
    fn default() -> Self {
        Self::new()
    }
}

impl Nes {
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            ppu: Ppu::new(),
            apu: Apu::new(44_100, 60),
            rom: Rom::default(),
            mapper: None,
            input: Input::new(DEV_JOYPAD0 | DEV_JOYPAD1),
            scanline: VBLANK_LINE,
            scanline_cycles: 0.0,
            fiq_state: 0,
            fiq_cycles: FIQ_PERIOD,
            fiq_occurred: false,
            paused: false,
            frame_count: 0,
            prng: Prng::new(DEFAULT_SEED),
            debug_events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    pub fn has_cartridge(&self) -> bool {
        self.mapper.is_some()
    }

    pub fn rom(&self) -> &Rom {
        &self.rom
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn ppu(&self) -> &Ppu {
        &self.ppu
    }

    pub fn apu_mut(&mut self) -> &mut Apu {
        &mut self.apu
    }

    pub fn input(&self) -> &Input {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut Input {
        &mut self.input
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn set_seed(&mut self, seed: u32) {
        self.prng = Prng::new(seed);
    }

    pub fn set_draw_sprites(&mut self, draw: bool) {
        self.ppu.set_draw_sprites(draw);
    }

    /// Mapper name plus the ROM summary line.
    pub fn info(&self) -> String {
        if self.mapper.is_none() {
            return "No ROM loaded".to_string();
        }
        format!(
            "{} (mapper {}): {}",
            mapper_name(self.rom.mapper_number),
            self.rom.mapper_number,
            self.rom.info()
        )
    }

    pub fn recent_events(&self, limit: usize) -> Vec<String> {
        self.debug_events
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub(crate) fn push_debug_event<S: Into<String>>(&mut self, event: S) {
        push_event(&mut self.debug_events, event);
    }

    fn drain_ppu_notes(&mut self) {
        if self.ppu.notes.is_empty() {
            return;
        }
        for note in self.ppu.take_notes() {
            push_event(&mut self.debug_events, note);
        }
    }

    pub(crate) fn with_mapper<R>(
        &mut self,
        f: impl FnOnce(&mut dyn Mapper, &mut MapperCtx) -> R,
    ) -> Option<R> {
        let mapper = self.mapper.as_deref_mut()?;
        let mut ctx = MapperCtx {
            cpu: &mut self.cpu,
            ppu: &mut self.ppu,
            rom: &mut self.rom,
            events: &mut self.debug_events,
            scanline: self.scanline,
        };
        Some(f(mapper, &mut ctx))
    }

    /// Replaces the cartridge and powers the machine on. An unsupported board fails
    /// before anything is touched.
    pub fn insert(&mut self, mut rom: Rom) -> Result<()> {
        let mapper = match create_mapper(rom.mapper_number) {
            Ok(mapper) => mapper,
            Err(err) => {
                self.push_debug_event(format!("ROM rejected: {err}"));
                return Err(err);
            }
        };

        for note in rom.notes.drain(..) {
            push_event(&mut self.debug_events, note);
        }

        let draw_sprites = self.ppu.draw_sprites;
        self.cpu = Cpu::new();
        self.ppu = Ppu::new();
        self.ppu.set_draw_sprites(draw_sprites);
        self.rom = rom;

        self.cpu.pages[6] = Page::new(Region::Sram, 0);
        self.cpu.pages[7] = Page::new(Region::Sram, CPU_PAGE_SIZE);

        self.apu.set_ext(mapper.sound_ext());
        self.mapper = Some(mapper);

        self.push_debug_event(format!("ROM loaded: {}", self.info()));
        if let Some(kind) = self.apu.ext_kind() {
            self.push_debug_event(format!("{} sound enabled", kind.name()));
        }

        self.reset(ResetKind::Hard);
        Ok(())
    }

    pub fn reset(&mut self, kind: ResetKind) {
        if self.mapper.is_none() {
            return;
        }

        if kind == ResetKind::Hard {
            self.cpu.ram.fill(0);
            if let Some(vram) = self.rom.region_mut(Region::Vram) {
                self.prng.fill(vram);
            }
        }

        self.apu.reset();
        self.ppu.reset(kind == ResetKind::Hard, &mut self.prng);
        self.with_mapper(|mapper, ctx| {
            set_default_pages(ctx);
            mapper.init(ctx);
        });
        self.cpu.reset(&self.rom);

        self.scanline = VBLANK_LINE;
        self.scanline_cycles = 0.0;
        self.fiq_cycles = FIQ_PERIOD;
        self.fiq_occurred = false;

        self.push_debug_event(match kind {
            ResetKind::Hard => "NES powered on",
            ResetKind::Soft => "NES reset",
        });
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    /// Battery-backed RAM as the cartridge currently sees it.
    pub fn sram(&self) -> &[u8] {
        self.rom.sram()
    }

    pub fn load_sram(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > SRAM_SIZE {
            bail!(
                "SRAM image is {} bytes, expected at most {SRAM_SIZE}",
                data.len()
            );
        }
        self.rom.sram[..data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Frame IRQ control ($4017 write).
    fn set_fiq(&mut self, value: u8) {
        self.fiq_state = value;
        self.fiq_cycles = FIQ_PERIOD;
    }

    fn check_fiq(&mut self, cycles: i32) {
        self.fiq_cycles -= cycles;
        if self.fiq_cycles <= 0 {
            self.fiq_cycles += FIQ_PERIOD;
            if self.fiq_state & 0xC0 == 0 {
                self.fiq_occurred = true;
                self.cpu.irq(&self.rom);
            }
        }
    }

    fn clear_fiq(&mut self) -> u8 {
        if self.fiq_occurred {
            self.fiq_occurred = false;
            0x40
        } else {
            0
        }
    }

    pub(crate) fn bus_read(&mut self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x1FFF => self.cpu.ram[addr as usize & 0x07FF],
            0x8000..=0xFFFF => self.cpu.read_page(&self.rom, addr),
            0x2000..=0x3FFF => {
                let value = self
                    .ppu
                    .read_register(&self.rom, addr, self.cpu.total_cycles);
                self.drain_ppu_notes();
                value
            }
            0x4015 => self.apu.read_register(addr) | self.clear_fiq(),
            0x4000..=0x4014 => self.apu.read_register(addr),
            0x4016 => self.input.read(DEV_JOYPAD0),
            0x4017 => self.input.read(DEV_ZAPPER | DEV_JOYPAD1),
            _ => self.handler_read(addr),
        }
    }

    /// Cartridge-side reads: expansion sound first, then the board, then open bus.
    fn handler_read(&mut self, addr: u16) -> u8 {
        if let Some(ext) = self.apu.ext_mut() {
            if in_ranges(ext.read_ranges(), addr) {
                return ext.read(addr);
            }
        }

        let mapped = self
            .mapper
            .as_ref()
            .is_some_and(|mapper| in_ranges(mapper.read_ranges(), addr));
        if mapped {
            if let Some(value) = self.with_mapper(|mapper, ctx| mapper.read(ctx, addr)) {
                return value;
            }
        }

        if (0x4018..=0x5FFF).contains(&addr) {
            return 0xFF;
        }
        self.cpu.read_page(&self.rom, addr)
    }

    pub(crate) fn bus_write(&mut self, addr: u16, value: u8) {
        match addr {
            0x0000..=0x1FFF => self.cpu.ram[addr as usize & 0x07FF] = value,
            0x2000..=0x3FFF => {
                self.ppu.write_register(&mut self.rom, addr, value);
                self.drain_ppu_notes();
            }
            0x4000..=0x4013 | 0x4015 => self.apu.write_register(addr, value),
            0x4014 => self.oam_dma(value),
            0x4016 => {
                self.with_mapper(|mapper, ctx| mapper.vrom_switch(ctx, value));
                self.input.write_strobe(value);
            }
            0x4017 => self.set_fiq(value),
            _ => self.handler_write(addr, value),
        }
    }

    fn handler_write(&mut self, addr: u16, value: u8) {
        if let Some(ext) = self.apu.ext_mut() {
            if in_ranges(ext.write_ranges(), addr) {
                ext.write(addr, value);
                return;
            }
        }

        let mapped = self
            .mapper
            .as_ref()
            .is_some_and(|mapper| in_ranges(mapper.write_ranges(), addr));
        if mapped {
            self.with_mapper(|mapper, ctx| mapper.write(ctx, addr, value));
            return;
        }

        if (0x4018..=0x5FFF).contains(&addr) || addr >= 0x8000 {
            return;
        }
        self.cpu.write_page(&mut self.rom, addr, value);
    }

    /// $4014: copy a CPU page into OAM, then stall the CPU and end its slice.
    fn oam_dma(&mut self, page: u8) {
        let base = (page as u16) << 8;
        let mut bytes = [0u8; OAM_SIZE];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = self.cpu.read_page(&self.rom, base.wrapping_add(i as u16));
        }
        self.ppu.write_oam_dma(&bytes);
        self.cpu.burn(OAM_DMA_CYCLES);
        self.cpu.release();
    }

    /// Runs one frame: scanlines interleaved with CPU slices, vblank NMI and the frame
    /// IRQ timer. With `draw` false nothing is rendered but sprite 0 is still timed.
    pub fn render_frame(&mut self, draw: bool) {
        if self.mapper.is_none() || self.paused {
            return;
        }

        let mut in_vblank = false;
        while self.scanline != SCANLINES_PER_FRAME {
            let cycles = self.cpu.total_cycles;
            self.ppu.scanline(
                &self.rom,
                self.mapper.as_deref_mut(),
                self.scanline,
                draw,
                cycles,
            );
            self.drain_ppu_notes();

            if self.scanline == VBLANK_LINE {
                let elapsed = self.execute(NMI_DELAY_CYCLES);
                self.scanline_cycles -= elapsed as f32;
                self.check_fiq(elapsed);
                if self.ppu.nmi_enabled() {
                    self.cpu.nmi(&self.rom);
                }
                self.with_mapper(|mapper, ctx| mapper.vblank(ctx));
                in_vblank = true;
            }

            self.with_mapper(|mapper, ctx| mapper.hblank(ctx, in_vblank));

            self.scanline_cycles += SCANLINE_CYCLES;
            let elapsed = self.execute(self.scanline_cycles as i32);
            self.scanline_cycles -= elapsed as f32;
            self.check_fiq(elapsed);

            self.ppu.end_scanline(self.scanline);
            self.scanline += 1;
        }

        self.scanline = 0;
        self.frame_count += 1;
    }

    /// Synthesises `out.len()` samples of the current frame's audio.
    pub fn process_audio<S: AudioSample>(&mut self, out: &mut [S]) {
        self.apu.process(&mut self.cpu, &self.rom, out);
    }

    pub fn samples_per_frame(&self) -> usize {
        self.apu.samples_per_frame()
    }

    pub fn frame_pixel(&self, x: usize, y: usize) -> u8 {
        self.ppu.frame_pixel(x, y)
    }

    pub fn frame_row(&self, y: usize, out: &mut [u8]) {
        self.ppu.frame_row(y, out);
    }

    pub fn frame(&self) -> Vec<u8> {
        self.ppu.frame()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::nes::cartridge::tests::make_rom;
    use crate::nes::input::BUTTON_A;

    const RESET_AT: usize = 0x0000;
    const NMI_AT: usize = 0x0100;
    const IRQ_AT: usize = 0x0200;

    /// Mapper 0 cart whose reset code is `program`; NMI and IRQ count into $10 and $11.
    pub(crate) fn program_rom(program: &[u8]) -> Rom {
        let mut rom = make_rom(0, 2, 1);
        rom.prg[RESET_AT..RESET_AT + program.len()].copy_from_slice(program);
        rom.prg[NMI_AT..NMI_AT + 3].copy_from_slice(&[0xE6, 0x10, 0x40]);
        rom.prg[IRQ_AT..IRQ_AT + 3].copy_from_slice(&[0xE6, 0x11, 0x40]);
        let vectors = rom.prg.len() - 6;
        rom.prg[vectors..].copy_from_slice(&[0x00, 0x81, 0x00, 0x80, 0x00, 0x82]);
        rom
    }

    pub(crate) fn machine(program: &[u8]) -> Nes {
        let mut nes = Nes::new();
        nes.insert(program_rom(program)).expect("mapper 0 is supported");
        nes
    }

    const SPIN: &[u8] = &[0x4C, 0x00, 0x80];

    #[test]
    fn power_on_starts_at_reset_vector_in_vblank() {
        assert!(!Nes::new().has_cartridge());
        let nes = machine(SPIN);
        assert!(nes.has_cartridge());
        assert_eq!(nes.cpu.pc, 0x8000);
        assert_eq!(nes.scanline, VBLANK_LINE);
        assert!(nes.recent_events(1)[0].contains("powered on"));
    }

    #[test]
    fn vblank_nmi_fires_once_per_frame_when_enabled() {
        // LDA #$80; STA $2000; JMP *
        let mut nes = machine(&[0xA9, 0x80, 0x8D, 0x00, 0x20, 0x4C, 0x05, 0x80]);
        nes.render_frame(true);
        assert_eq!(nes.cpu.ram[0x10], 0);
        nes.render_frame(true);
        nes.render_frame(false);
        assert_eq!(nes.cpu.ram[0x10], 2);
        assert_eq!(nes.frame_count(), 3);
        assert_eq!(nes.scanline, 0);
    }

    #[test]
    fn frame_irq_sets_status_bit_until_read() {
        let mut nes = machine(SPIN);
        for _ in 0..3 {
            nes.render_frame(false);
        }
        assert_eq!(nes.bus_read(0x4015) & 0x40, 0x40);
        assert_eq!(nes.bus_read(0x4015) & 0x40, 0);
        assert!(nes.cpu.int_pending);
    }

    #[test]
    fn masked_frame_irq_stays_quiet() {
        let mut nes = machine(SPIN);
        nes.bus_write(0x4017, 0x40);
        for _ in 0..3 {
            nes.render_frame(false);
        }
        assert_eq!(nes.bus_read(0x4015) & 0x40, 0);
        assert!(!nes.cpu.int_pending);
    }

    #[test]
    fn oam_dma_copies_page_and_stalls() {
        let mut nes = machine(SPIN);
        for i in 0..OAM_SIZE {
            nes.cpu.ram[0x200 + i] = i as u8;
        }
        nes.cpu.burn_cycles = 0;
        nes.bus_write(0x4014, 0x02);
        assert_eq!(nes.ppu.oam[0], 0);
        assert_eq!(nes.ppu.oam[255], 255);
        assert_eq!(nes.cpu.burn_cycles, OAM_DMA_CYCLES);
        assert_eq!(nes.cpu.remaining_cycles, 0);
    }

    #[test]
    fn bus_mirrors_ram_and_guards_open_ranges() {
        let mut nes = machine(SPIN);
        nes.bus_write(0x0801, 7);
        assert_eq!(nes.bus_read(0x0001), 7);
        assert_eq!(nes.bus_read(0x1801), 7);

        assert_eq!(nes.bus_read(0x4018), 0xFF);
        assert_eq!(nes.bus_read(0x5000), 0xFF);

        let before = nes.bus_read(0x8000);
        nes.bus_write(0x8000, !before);
        assert_eq!(nes.bus_read(0x8000), before);
    }

    #[test]
    fn sram_window_reaches_cartridge_ram() {
        let mut nes = machine(SPIN);
        nes.bus_write(0x6000, 0x12);
        nes.bus_write(0x7FFF, 0x34);
        assert_eq!(nes.sram()[0], 0x12);
        assert_eq!(nes.sram()[SRAM_SIZE - 1], 0x34);

        nes.load_sram(&[0xAB; 4]).expect("fits");
        assert_eq!(nes.bus_read(0x6003), 0xAB);
        assert!(nes.load_sram(&vec![0; SRAM_SIZE + 1]).is_err());
    }

    #[test]
    fn joypad_reads_through_the_bus() {
        let mut nes = machine(SPIN);
        nes.input_mut().set(DEV_JOYPAD0, BUTTON_A as u16);
        nes.bus_write(0x4016, 1);
        nes.bus_write(0x4016, 0);
        assert_eq!(nes.bus_read(0x4016), 0x41);
        assert_eq!(nes.bus_read(0x4016), 0x40);
        assert_eq!(nes.bus_read(0x4017) & 0x01, 0);
    }

    #[test]
    fn unsupported_board_leaves_machine_untouched() {
        let mut nes = machine(SPIN);
        nes.cpu.ram[0x42] = 0x99;
        let mut rom = make_rom(0, 1, 1);
        rom.mapper_number = 6;
        assert!(nes.insert(rom).is_err());
        assert_eq!(nes.cpu.ram[0x42], 0x99);
        assert_eq!(nes.rom.mapper_number, 0);
        assert!(nes.recent_events(1)[0].contains("not yet implemented"));
    }

    #[test]
    fn hard_reset_scrambles_chr_ram_reproducibly() {
        let mut first = Nes::new();
        first.insert(make_rom(2, 2, 0)).expect("supported");
        let mut second = Nes::new();
        second.insert(make_rom(2, 2, 0)).expect("supported");
        assert_eq!(first.rom.vram, second.rom.vram);
        assert!(first.rom.vram.iter().any(|&b| b != 0));

        first.cpu.ram[5] = 1;
        first.reset(ResetKind::Soft);
        assert_eq!(first.cpu.ram[5], 1);
        first.reset(ResetKind::Hard);
        assert_eq!(first.cpu.ram[5], 0);

        let mut reseeded = Nes::new();
        reseeded.set_seed(7);
        reseeded.insert(make_rom(2, 2, 0)).expect("supported");
        assert_ne!(reseeded.rom.vram, second.rom.vram);
    }

    #[test]
    fn paused_machine_does_not_advance() {
        let mut nes = machine(SPIN);
        nes.set_paused(true);
        let cycles = nes.cpu.total_cycles();
        nes.render_frame(true);
        assert_eq!(nes.cpu.total_cycles(), cycles);
        assert_eq!(nes.frame_count(), 0);

        nes.toggle_pause();
        assert!(!nes.paused());
        nes.render_frame(false);
        assert_eq!(nes.frame_count(), 1);
    }

    #[test]
    fn event_ring_keeps_the_newest_entries() {
        let mut nes = Nes::new();
        for i in 0..MAX_EVENTS + 10 {
            nes.push_debug_event(format!("event {i}"));
        }
        let events = nes.recent_events(usize::MAX);
        assert_eq!(events.len(), MAX_EVENTS);
        assert_eq!(events[0], format!("event {}", MAX_EVENTS + 9));
        assert_eq!(nes.recent_events(0).len(), 0);
    }

    #[test]
    fn frames_render_with_a_bank_switching_board() {
        let mut nes = Nes::new();
        nes.insert(make_rom(4, 8, 8)).expect("MMC3 supported");
        nes.bus_write(0x2001, 0x18);
        nes.render_frame(true);
        nes.render_frame(false);
        assert_eq!(nes.frame_count(), 2);
        assert_eq!(nes.scanline, 0);
    }

    #[test]
    fn frame_cycles_track_the_scanline_budget() {
        let mut nes = machine(SPIN);
        nes.render_frame(false);
        let start = nes.cpu.total_cycles();
        nes.render_frame(false);
        let spent = (nes.cpu.total_cycles() - start) as f64;
        let budget = SCANLINES_PER_FRAME as f64 * SCANLINE_CYCLES as f64;
        assert!((spent - budget).abs() < 8.0, "spent {spent}, budget {budget}");
    }
}
