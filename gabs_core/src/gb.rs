//! Top-level CPU/memory aggregate for one GBS driver instance.

use super::cpu::Cpu;
use super::gbs::Gbs;
use super::mmu::{Memory, Mmu};

/// DMG reset values for the APU registers 0xFF10-0xFF2F. Written through the
/// normal write path on every song init, so the register hooks fire.
#[rustfmt::skip]
const APU_RESET_VALUES: [u8; 0x20] = [
    0x80, 0xBF, 0xF3, 0xFF, 0xBF,
    0xFF, 0x3F, 0x00, 0xFF, 0xBF,
    0x7F, 0xFF, 0x9F, 0xFF, 0xBF,
    0xFF, 0xFF, 0x00, 0x00, 0xBF,
    0x77, 0xF3, 0xF1,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
];

pub struct Gameboy {
    pub cpu: Cpu,
    pub mmu: Mmu,
    init_address: u16,
    stack_pointer: u16,
    timer_modulo: u8,
    timer_control: u8,
}

impl Gameboy {
    /// Builds the driver machine from a parsed GBS file. The caller still
    /// needs to `reset` for a song before running frames.
    pub fn power_on(gbs: &Gbs) -> Self {
        Gameboy {
            cpu: Cpu::power_on(gbs.load_address, gbs.play_address),
            mmu: Mmu::power_on(gbs),
            init_address: gbs.init_address,
            stack_pointer: gbs.stack_pointer,
            timer_modulo: gbs.timer_modulo,
            timer_control: gbs.timer_control,
        }
    }

    /// Resets the machine and arranges for the driver's init routine to run
    /// with the given song index in A.
    ///
    /// The word at the initial stack pointer is zeroed so the init routine's
    /// final RET lands in the vector page, where the CPU parks itself until
    /// the first VBLANK hands control to the play routine.
    pub fn reset(&mut self, song: u8) {
        self.mmu.reset_banks();
        self.mmu.lcd.reset();
        self.mmu.write_byte(self.stack_pointer, 0x00);
        self.mmu.write_byte(self.stack_pointer.wrapping_add(1), 0x00);
        self.mmu.timer.reset(self.timer_modulo, self.timer_control);
        self.mmu.intf = 0xE1;

        for (i, &val) in APU_RESET_VALUES.iter().enumerate() {
            self.mmu.write_byte(0xFF10 + i as u16, val);
        }
        // The defaults above ran the register hooks; the derived channel
        // state starts from silence regardless.
        self.mmu.apu.reset_channels();

        // Timer-driven GBS files take the play interrupt from TIMA,
        // everything else from VBLANK
        self.mmu.ie = if self.timer_control & 0x02 != 0 {
            super::mmu::InterruptKind::Timer as u8
        } else {
            super::mmu::InterruptKind::VBlank as u8
        };

        self.cpu.reset(song, self.stack_pointer, self.init_address);
    }

    /// Executes one CPU instruction and updates the other
    /// subsystems with the appropriate number of cycles.
    pub fn step(&mut self) -> usize {
        let cycles = self.cpu.tick(&mut self.mmu);
        self.mmu.update(cycles);
        cycles
    }

    /// Steps the CPU until the LCD latches the next frame edge, one logical
    /// 60 Hz tick. Returns the cycles consumed.
    pub fn run_frame(&mut self) -> usize {
        self.mmu.lcd.clear_frame();
        let mut cycles = 0;
        while !self.mmu.lcd.frame() {
            cycles += self.step();
        }
        cycles
    }
}

#[cfg(test)]
mod gb_tests {
    use super::*;
    use crate::gbs::HEADER_SIZE;

    fn test_gameboy() -> Gameboy {
        let mut data = vec![0u8; HEADER_SIZE + 0x200];
        data[0..4].copy_from_slice(b"GBS\x01");
        data[0x04] = 2;
        data[0x05] = 1;
        data[0x06..0x08].copy_from_slice(&0x4000u16.to_le_bytes());
        data[0x08..0x0A].copy_from_slice(&0x4000u16.to_le_bytes());
        data[0x0A..0x0C].copy_from_slice(&0x4080u16.to_le_bytes());
        data[0x0C..0x0E].copy_from_slice(&0xE000u16.to_le_bytes());
        // Init routine: RET. Play routine: RET.
        data[HEADER_SIZE] = 0xC9;
        data[HEADER_SIZE + 0x80] = 0xC9;
        Gameboy::power_on(&Gbs::parse(data.into_boxed_slice()).unwrap())
    }

    #[test]
    fn reset_seeds_cpu_and_ie() {
        let mut gb = test_gameboy();
        gb.reset(1);
        assert_eq!(gb.cpu.reg.a, 1);
        assert_eq!(gb.cpu.reg.f, 0xB0);
        assert_eq!(gb.cpu.reg.pc, 0x4000);
        assert_eq!(gb.cpu.reg.sp, 0xE000);
        assert_eq!(gb.mmu.ie, 0x01);
        // The return word at SP points into the vector page
        assert_eq!(gb.mmu.read_word(0xE000), 0x0000);
    }

    #[test]
    fn apu_registers_take_reset_defaults() {
        let mut gb = test_gameboy();
        gb.reset(0);
        assert_eq!(gb.mmu.read_byte(0xFF12), 0xF3);
        assert_eq!(gb.mmu.read_byte(0xFF24), 0x77);
        assert_eq!(gb.mmu.read_byte(0xFF25), 0xF3);
        // Master on; ch1 and ch4 status asserted by the reset retriggers
        assert_eq!(gb.mmu.apu.status(), 0x89);
        // Derived state is cleared after the register writes
        assert_eq!(gb.mmu.apu.ch1.volume, 0);
        assert!(!gb.mmu.apu.ch1.dac_enabled);
    }

    #[test]
    fn init_ret_parks_cpu_until_vblank() {
        let mut gb = test_gameboy();
        gb.reset(0);
        // First frame runs the init routine, whose RET lands at 0x0000 and
        // parks the CPU; the primed LCD then raises VBLANK.
        gb.run_frame();
        // The next frame enters through the play address
        let cycles = gb.run_frame();
        assert!(cycles > 0);
        assert!(gb.cpu.reg.pc >= 0x4000 || gb.cpu.reg.pc == 0x0000);
    }

    #[test]
    fn frame_cycles_accumulate_consistently() {
        let mut gb = test_gameboy();
        gb.reset(0);
        gb.run_frame();
        // With a bare RET play routine the parked CPU skips straight from
        // the play dispatch to the next primed VBLANK, so a steady frame is
        // only a handful of instructions long.
        let cycles = gb.run_frame();
        assert!(cycles >= 16);
        assert!(cycles < 1000);
        // The frame edge always lands at the start of the VBLANK region
        assert_eq!(gb.mmu.read_byte(0xFF44), 144);
    }
}
