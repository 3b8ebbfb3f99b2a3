pub const BUTTON_A: u8 = 0x01;
pub const BUTTON_B: u8 = 0x02;
pub const BUTTON_SELECT: u8 = 0x04;
pub const BUTTON_START: u8 = 0x08;
pub const BUTTON_UP: u8 = 0x10;
pub const BUTTON_DOWN: u8 = 0x20;
pub const BUTTON_LEFT: u8 = 0x40;
pub const BUTTON_RIGHT: u8 = 0x80;

pub const ZAPPER_MISS: u8 = 0x08;
pub const ZAPPER_TRIGGER: u8 = 0x10;

pub const DEV_JOYPAD0: u8 = 0x01;
pub const DEV_JOYPAD1: u8 = 0x02;
pub const DEV_ZAPPER: u8 = 0x04;
pub const DEV_POWERPAD: u8 = 0x08;
pub const DEV_ARKANOID: u8 = 0x10;
pub const DEV_VSDIP0: u8 = 0x20;
pub const DEV_VSDIP1: u8 = 0x40;
pub const DEV_ALL: u8 = 0x7F;

const DEVICE_COUNT: usize = 7;

/// Power pad button bits as the pad reports them: the low byte shifts out on D3,
/// the high byte on D4.
pub const POWERPAD_BUTTONS: [u16; 12] = [
    0x0002, 0x0001, 0x0200, 0x0100, 0x0004, 0x0010, 0x0080, 0x0800, 0x0008, 0x0020, 0x0040,
    0x0400,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Make,
    Break,
}

/// Controller port state. Each device holds a make/break bitmask; serial devices
/// shift one bit out per read until the next strobe.
#[derive(Debug, Clone, Default)]
pub struct Input {
    connected: u8,
    data: [u16; DEVICE_COUNT],
    pad0_reads: u32,
    pad1_reads: u32,
    powerpad_reads: u32,
    arkanoid_reads: u32,
    strobe_latch: u8,
}

fn slot(device: u8) -> Option<usize> {
    if device.count_ones() != 1 || device & DEV_ALL == 0 {
        return None;
    }
    Some(device.trailing_zeros() as usize)
}

/// Opposite directions pressed together cancel out.
fn mask_opposites(mut value: u8) -> u8 {
    if value & BUTTON_UP != 0 && value & BUTTON_DOWN != 0 {
        value &= !(BUTTON_UP | BUTTON_DOWN);
    }
    if value & BUTTON_LEFT != 0 && value & BUTTON_RIGHT != 0 {
        value &= !(BUTTON_LEFT | BUTTON_RIGHT);
    }
    value
}

fn shift_bit(value: u16, count: u32) -> u8 {
    (value.checked_shr(count).unwrap_or(0) & 1) as u8
}

impl Input {
    pub fn new(devices: u8) -> Self {
        Self {
            connected: devices & DEV_ALL,
            ..Self::default()
        }
    }

    pub fn connected(&self) -> u8 {
        self.connected
    }

    pub fn connect(&mut self, devices: u8) {
        self.connected |= devices & DEV_ALL;
    }

    pub fn disconnect(&mut self, devices: u8) {
        self.connected &= !devices;
        for bit in 0..DEVICE_COUNT {
            if devices & (1 << bit) != 0 {
                self.data[bit] = 0;
            }
        }
    }

    /// Presses (make) or releases (break) `value` bits on a single device.
    pub fn event(&mut self, device: u8, state: KeyState, value: u16) {
        let Some(index) = slot(device) else {
            return;
        };
        match state {
            KeyState::Make => self.data[index] |= value,
            KeyState::Break => self.data[index] &= !value,
        }
    }

    /// Replaces a device's bitmask outright.
    pub fn set(&mut self, device: u8, value: u16) {
        if let Some(index) = slot(device) {
            self.data[index] = value;
        }
    }

    pub fn state(&self, device: u8) -> u16 {
        slot(device).map_or(0, |index| self.data[index])
    }

    fn retrieve(&self, device: u8) -> u16 {
        if self.connected & device == 0 {
            return 0;
        }
        self.state(device)
    }

    pub fn strobe(&mut self) {
        self.pad0_reads = 0;
        self.pad1_reads = 0;
        self.powerpad_reads = 0;
        self.arkanoid_reads = 0;
    }

    /// $4016 write: the serial counters rewind on the falling edge of bit 0.
    pub fn write_strobe(&mut self, value: u8) {
        if self.strobe_latch & 1 != 0 && value & 1 == 0 {
            self.strobe();
        }
        self.strobe_latch = value;
    }

    /// ORs together the port byte of every device in `devices`.
    pub fn read(&mut self, devices: u8) -> u8 {
        let mut value = 0;
        if devices & DEV_JOYPAD0 != 0 {
            let pad = mask_opposites(self.retrieve(DEV_JOYPAD0) as u8);
            value |= 0x40 | shift_bit(pad as u16, self.pad0_reads);
            self.pad0_reads = self.pad0_reads.saturating_add(1);
        }
        if devices & DEV_JOYPAD1 != 0 {
            let pad = mask_opposites(self.retrieve(DEV_JOYPAD1) as u8);
            value |= 0x40 | shift_bit(pad as u16, self.pad1_reads);
            self.pad1_reads = self.pad1_reads.saturating_add(1);
        }
        if devices & DEV_ZAPPER != 0 {
            value |= self.retrieve(DEV_ZAPPER) as u8;
        }
        if devices & DEV_POWERPAD != 0 {
            let pad = self.retrieve(DEV_POWERPAD);
            if shift_bit(pad >> 8, self.powerpad_reads) != 0 {
                value |= 0x10;
            }
            if shift_bit(pad & 0xFF, self.powerpad_reads) != 0 {
                value |= 0x08;
            }
            self.powerpad_reads = self.powerpad_reads.saturating_add(1);
        }
        if devices & DEV_VSDIP0 != 0 {
            value |= self.retrieve(DEV_VSDIP0) as u8;
        }
        if devices & DEV_VSDIP1 != 0 {
            value |= self.retrieve(DEV_VSDIP1) as u8;
        }
        if devices & DEV_ARKANOID != 0 {
            let paddle = self.retrieve(DEV_ARKANOID) as u8;
            let bit = 7u32.checked_sub(self.arkanoid_reads).map_or(0, |shift| (paddle >> shift) & 1);
            if bit != 0 {
                value |= 0x02;
            }
            self.arkanoid_reads = self.arkanoid_reads.saturating_add(1);
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_pad(input: &mut Input, device: u8) -> Vec<u8> {
        (0..8).map(|_| input.read(device) & 1).collect()
    }

    #[test]
    fn joypad_shifts_out_buttons_in_order() {
        let mut input = Input::new(DEV_JOYPAD0);
        input.event(DEV_JOYPAD0, KeyState::Make, (BUTTON_A | BUTTON_START) as u16);
        assert_eq!(read_pad(&mut input, DEV_JOYPAD0), [1, 0, 0, 1, 0, 0, 0, 0]);
        assert_eq!(input.read(DEV_JOYPAD0), 0x40);
        assert_eq!(input.read(DEV_JOYPAD0), 0x40);

        input.write_strobe(1);
        input.write_strobe(0);
        assert_eq!(input.read(DEV_JOYPAD0), 0x41);
    }

    #[test]
    fn strobe_only_rewinds_on_falling_edge() {
        let mut input = Input::new(DEV_JOYPAD0);
        input.set(DEV_JOYPAD0, BUTTON_A as u16);
        assert_eq!(input.read(DEV_JOYPAD0), 0x41);
        input.write_strobe(0);
        assert_eq!(input.read(DEV_JOYPAD0), 0x40);
        input.write_strobe(1);
        assert_eq!(input.read(DEV_JOYPAD0), 0x40);
        input.write_strobe(0);
        assert_eq!(input.read(DEV_JOYPAD0), 0x41);
    }

    #[test]
    fn opposite_directions_cancel() {
        let mut input = Input::new(DEV_JOYPAD1);
        input.set(
            DEV_JOYPAD1,
            (BUTTON_UP | BUTTON_DOWN | BUTTON_LEFT | BUTTON_B) as u16,
        );
        assert_eq!(read_pad(&mut input, DEV_JOYPAD1), [0, 1, 0, 0, 0, 0, 1, 0]);
    }

    #[test]
    fn break_releases_only_named_bits() {
        let mut input = Input::new(DEV_JOYPAD0);
        input.event(DEV_JOYPAD0, KeyState::Make, (BUTTON_A | BUTTON_B) as u16);
        input.event(DEV_JOYPAD0, KeyState::Break, BUTTON_A as u16);
        assert_eq!(input.state(DEV_JOYPAD0), BUTTON_B as u16);
    }

    #[test]
    fn disconnected_devices_read_idle() {
        let mut input = Input::new(DEV_JOYPAD0);
        input.set(DEV_JOYPAD1, BUTTON_A as u16);
        assert_eq!(input.read(DEV_JOYPAD1), 0x40);
        input.connect(DEV_JOYPAD1);
        input.strobe();
        assert_eq!(input.read(DEV_JOYPAD1), 0x41);
    }

    #[test]
    fn zapper_and_joypad_share_the_second_port() {
        let mut input = Input::new(DEV_JOYPAD1 | DEV_ZAPPER);
        input.set(DEV_ZAPPER, (ZAPPER_MISS | ZAPPER_TRIGGER) as u16);
        input.set(DEV_JOYPAD1, BUTTON_A as u16);
        assert_eq!(input.read(DEV_ZAPPER | DEV_JOYPAD1), 0x40 | 0x18 | 0x01);
    }

    #[test]
    fn power_pad_reports_both_bytes() {
        let mut input = Input::new(DEV_POWERPAD);
        input.set(DEV_POWERPAD, POWERPAD_BUTTONS[1] | POWERPAD_BUTTONS[3]);
        assert_eq!(input.read(DEV_POWERPAD), 0x18);
        assert_eq!(input.read(DEV_POWERPAD), 0x00);
    }

    #[test]
    fn arkanoid_shifts_msb_first() {
        let mut input = Input::new(DEV_ARKANOID);
        input.set(DEV_ARKANOID, 0x81);
        let bits: Vec<u8> = (0..9).map(|_| input.read(DEV_ARKANOID)).collect();
        assert_eq!(bits, [2, 0, 0, 0, 0, 0, 0, 2, 0]);
    }

    #[test]
    fn single_device_events_ignore_combined_masks() {
        let mut input = Input::new(DEV_ALL);
        input.event(DEV_JOYPAD0 | DEV_JOYPAD1, KeyState::Make, 1);
        assert_eq!(input.state(DEV_JOYPAD0), 0);
        assert_eq!(input.state(DEV_JOYPAD1), 0);
    }
}
