use super::mmu::{InterruptKind, Memory};

/// Number of CPU cycles per DIV increment (16384 Hz).
const DIV_CYCLES: usize = 256;

pub struct Timer {
    /// 0xFF04: Divider Register
    /// Increments at 16384 Hz, and wraps around. Resets to 0x00 when written to.
    div: u8,
    /// 0xFF05: Timer Counter
    /// Incremented at the rate selected by TAC. On overflow it is reloaded
    /// from TMA and a Timer interrupt is requested.
    tima: u8,
    /// 0xFF06: Timer Modulo
    /// TIMA is set to this value when the timer overflows.
    /// GBS files seed this from the header for timer-driven playback.
    tma: u8,
    /// 0xFF07: Timer Control
    /// Bit 2: 0 means stop the timer, 1 means start the timer
    /// Bit 1-0: Selects timer frequency
    ///
    ///     - 00: 4096 Hz
    ///     - 01: 262144 Hz
    ///     - 10: 65536 Hz
    ///     - 11: 16384 Hz
    tac: u8,
    /// Tracks the current cycles before incrementing DIV
    div_cycles: usize,
    /// Tracks the current cycles before incrementing TIMA, depends on TAC rate
    tima_cycles: usize,
}

impl Timer {
    pub fn power_on() -> Self {
        Timer {
            div: 0x0,
            tima: 0x0,
            tma: 0x0,
            tac: 0x0,
            div_cycles: 0,
            tima_cycles: 0,
        }
    }

    /// Reinitializes the timer for a new song with the TMA/TAC values taken
    /// from the GBS header.
    pub fn reset(&mut self, timer_modulo: u8, timer_control: u8) {
        self.div = 0xAB;
        self.tima = 0x00;
        self.tma = timer_modulo;
        self.tac = timer_control;
        self.div_cycles = 0;
        self.tima_cycles = 0;
    }

    /// Updates all the timer registers up to the same cycles as the CPU.
    /// Returns an Option with an Interrupt::Timer if the timer overflowed.
    pub fn update(&mut self, cycles: usize) -> Option<InterruptKind> {
        // Update DIV timer
        self.div_cycles += cycles;
        if self.div_cycles >= DIV_CYCLES {
            self.div = self.div.wrapping_add(1);
            self.div_cycles -= DIV_CYCLES;
        }
        // Update TIMA timer
        let mut overflowed = false;
        if !self.timer_stopped() {
            self.tima_cycles += cycles;
            while self.tima_cycles >= self.tima_period() {
                self.tima_cycles -= self.tima_period();
                self.tima = self.tima.wrapping_add(1);
                if self.tima == 0x0 {
                    self.tima = self.tma;
                    overflowed = true;
                }
            }
        }
        if overflowed {
            Some(InterruptKind::Timer)
        } else {
            None
        }
    }

    /// Reads the value of the TAC register and returns the number of
    /// CPU cycles needed before incrementing the TIMA register
    fn tima_period(&self) -> usize {
        match self.tac & 0b11 {
            0b00 => 1024,
            0b01 => 16,
            0b10 => 64,
            _ => 256,
        }
    }

    fn timer_stopped(&self) -> bool {
        ((self.tac >> 2) & 0b1) != 0b1
    }
}

impl Memory for Timer {
    fn read_byte(&self, addr: u16) -> u8 {
        match addr {
            0xFF04 => self.div,
            0xFF05 => self.tima,
            0xFF06 => self.tma,
            0xFF07 => self.tac,
            _ => panic!("0x{:X}: Improper Timer Address", addr),
        }
    }

    fn write_byte(&mut self, addr: u16, val: u8) {
        match addr {
            // A DIV write also restarts the TIMA count
            0xFF04 => {
                self.div = 0x0;
                self.tima_cycles = 0;
            }
            0xFF05 => self.tima = val,
            0xFF06 => self.tma = val,
            0xFF07 => self.tac = val,
            _ => panic!("0x{:X}: Improper Timer Address", addr),
        }
    }
}

#[cfg(test)]
mod timer_tests {
    use super::*;

    #[test]
    fn div_increments() {
        let mut timer = Timer::power_on();
        assert!(timer.update(255).is_none());
        assert_eq!(timer.read_byte(0xFF04), 0x00);
        assert!(timer.update(1).is_none());
        assert_eq!(timer.read_byte(0xFF04), 0x01);
    }

    #[test]
    fn tima_overflow_reloads_tma() {
        let mut timer = Timer::power_on();
        // Fastest rate (16 cycles), TMA of 0xF0
        timer.write_byte(0xFF06, 0xF0);
        timer.write_byte(0xFF07, 0b101);
        timer.write_byte(0xFF05, 0xFF);
        let int = timer.update(16);
        assert_eq!(int, Some(InterruptKind::Timer));
        assert_eq!(timer.read_byte(0xFF05), 0xF0);
    }

    #[test]
    fn tima_stopped_without_enable() {
        let mut timer = Timer::power_on();
        timer.write_byte(0xFF07, 0b001);
        timer.write_byte(0xFF05, 0xFF);
        assert!(timer.update(1024).is_none());
        assert_eq!(timer.read_byte(0xFF05), 0xFF);
    }
}
