//! Per-sample stereo mixer.
//!
//! Each channel owns a free-running phase accumulator stepped from the
//! frequency tables. The pulse waveform and LFSR table selections are not
//! read per sample: the scheduler re-latches them once per 60 Hz frame,
//! after the play routine has run.

use super::apu::Apu;
use super::tables::{Tables, DUTY_TABLES, LFSR15_LEN, LFSR7_LEN, WAVE_LEN};
use super::util::bit::*;

pub struct Synth {
    sample_rate: f32,
    tables: Tables,
    /// Phase of each channel: position within the 32-sample waveform for
    /// channels 1-3, bit position within the LFSR stream for channel 4.
    channel_pos: [f32; 4],
    /// Latched duty selections for the pulse channels.
    duty1: usize,
    duty2: usize,
    /// Latched LFSR width selector from NR43 bit 3.
    lfsr_narrow: bool,
}

impl Synth {
    pub fn new(sample_rate: u32) -> Self {
        Synth {
            sample_rate: sample_rate as f32,
            tables: Tables::build(),
            channel_pos: [0.0; 4],
            duty1: 0,
            duty2: 0,
            lfsr_narrow: false,
        }
    }

    /// Resets the phase accumulators for a new song. Channel 2 starts
    /// slightly out of phase with channel 1 so identical tones don't cancel
    /// or double perfectly.
    pub fn reset(&mut self) {
        self.channel_pos = [0.0, 0.01, 0.0, 0.0];
    }

    /// Re-latches the waveform selections from the APU registers.
    pub fn latch_tables(&mut self, apu: &Apu) {
        self.duty1 = apu.duty_ch1();
        self.duty2 = apu.duty_ch2();
        self.lfsr_narrow = test_bit(apu.noise_ctrl(), 3);
    }

    /// Duty table index in use for the given pulse channel (0 or 1).
    pub fn duty_index(&self, channel: usize) -> usize {
        match channel {
            0 => self.duty1,
            _ => self.duty2,
        }
    }

    /// Period in samples of the LFSR stream currently in use.
    pub fn lfsr_len(&self) -> u16 {
        if self.lfsr_narrow {
            LFSR7_LEN
        } else {
            LFSR15_LEN
        }
    }

    /// Advances all phase accumulators by one sample and mixes one stereo
    /// frame. Channels only contribute when the master enable is on and
    /// their routing, DAC and status bits all agree.
    pub fn mix(&mut self, apu: &Apu) -> (i8, i8) {
        let wave_rate = self.sample_rate / WAVE_LEN as f32;
        self.channel_pos[0] += self.tables.freq[apu.freq_ch1() as usize] / wave_rate;
        self.channel_pos[1] += self.tables.freq[apu.freq_ch2() as usize] / wave_rate;
        self.channel_pos[2] += self.tables.freq[apu.freq_ch3() as usize] / wave_rate;
        self.channel_pos[3] +=
            self.tables.noise_freq[apu.noise_ctrl() as usize] / self.sample_rate;
        while self.channel_pos[0] >= WAVE_LEN as f32 {
            self.channel_pos[0] -= WAVE_LEN as f32;
        }
        while self.channel_pos[1] >= WAVE_LEN as f32 {
            self.channel_pos[1] -= WAVE_LEN as f32;
        }
        while self.channel_pos[2] >= WAVE_LEN as f32 {
            self.channel_pos[2] -= WAVE_LEN as f32;
        }
        let lfsr_len = self.lfsr_len() as f32;
        while self.channel_pos[3] >= lfsr_len {
            self.channel_pos[3] = 0.0;
        }

        let status = apu.status();
        if status & 0x80 == 0 {
            return (0, 0);
        }
        let pan = apu.panning();

        let pulse1 = if test_bit(status, 0) && apu.ch1.dac_enabled {
            apu.ch1.volume as i16 * DUTY_TABLES[self.duty1][self.channel_pos[0] as usize]
        } else {
            0
        };
        let pulse2 = if test_bit(status, 1) && apu.ch2.dac_enabled {
            apu.ch2.volume as i16 * DUTY_TABLES[self.duty2][self.channel_pos[1] as usize]
        } else {
            0
        };
        let wave = if test_bit(status, 2) && apu.ch3_dac_enabled() {
            apu.wave_ram[self.channel_pos[2] as usize] >> apu.ch3.volume_shift
        } else {
            0
        };
        let noise = if test_bit(status, 3) && apu.ch4.dac_enabled {
            let pos = self.channel_pos[3] as usize;
            let table = if self.lfsr_narrow {
                &self.tables.lfsr7
            } else {
                &self.tables.lfsr15
            };
            let level = if (table[pos / 8] >> (7 - (pos & 7))) & 0x1 != 0 {
                1
            } else {
                -1
            };
            apu.ch4.volume as i16 * level
        } else {
            0
        };

        let mut left: i16 = 0;
        let mut right: i16 = 0;
        if test_bit(pan, 0) {
            left += pulse1;
        }
        if test_bit(pan, 1) {
            left += pulse2;
        }
        if test_bit(pan, 2) {
            left += wave;
        }
        if test_bit(pan, 3) {
            left += noise;
        }
        if test_bit(pan, 4) {
            right += pulse1;
        }
        if test_bit(pan, 5) {
            right += pulse2;
        }
        if test_bit(pan, 6) {
            right += wave;
        }
        if test_bit(pan, 7) {
            right += noise;
        }

        (left as i8, right as i8)
    }
}

#[cfg(test)]
mod synth_tests {
    use super::*;
    use crate::mmu::Memory;

    fn audible_ch1(apu: &mut Apu) {
        apu.write_byte(0xFF26, 0x80); // master on
        apu.write_byte(0xFF25, 0x11); // ch1 both sides
        apu.write_byte(0xFF12, 0xF0); // vol 15, DAC on
        apu.write_byte(0xFF13, 0x00);
        apu.write_byte(0xFF14, 0x84); // retrigger, freq 0x400
    }

    #[test]
    fn master_disable_mutes() {
        let mut apu = Apu::power_on();
        let mut synth = Synth::new(crate::SAMPLE_RATE);
        audible_ch1(&mut apu);
        apu.write_byte(0xFF26, 0x00);
        for _ in 0..64 {
            assert_eq!(synth.mix(&apu), (0, 0));
        }
    }

    #[test]
    fn pulse_output_is_scaled_duty() {
        let mut apu = Apu::power_on();
        let mut synth = Synth::new(crate::SAMPLE_RATE);
        audible_ch1(&mut apu);
        synth.latch_tables(&apu);
        let mut seen_high = false;
        let mut seen_low = false;
        for _ in 0..256 {
            let (l, r) = synth.mix(&apu);
            assert_eq!(l, r);
            assert!(l == 15 || l == -15);
            seen_high |= l == 15;
            seen_low |= l == -15;
        }
        assert!(seen_high && seen_low);
    }

    #[test]
    fn panning_routes_channels() {
        let mut apu = Apu::power_on();
        let mut synth = Synth::new(crate::SAMPLE_RATE);
        audible_ch1(&mut apu);
        apu.write_byte(0xFF25, 0x10); // ch1 right only
        synth.latch_tables(&apu);
        for _ in 0..64 {
            let (l, r) = synth.mix(&apu);
            assert_eq!(l, 0);
            assert_ne!(r, 0);
        }
    }

    #[test]
    fn wave_shift_applies() {
        let mut apu = Apu::power_on();
        let mut synth = Synth::new(crate::SAMPLE_RATE);
        apu.write_byte(0xFF26, 0x80);
        apu.write_byte(0xFF25, 0x04); // ch3 left only
        apu.write_byte(0xFF1A, 0x80); // DAC on
        apu.write_byte(0xFF1C, 0x40); // half volume, shift 2
        for i in 0..16 {
            apu.write_byte(0xFF30 + i, 0xFF); // all samples +15
        }
        apu.write_byte(0xFF1E, 0x80); // retrigger
        synth.latch_tables(&apu);
        let (l, r) = synth.mix(&apu);
        assert_eq!(l, 15 >> 2);
        assert_eq!(r, 0);
    }
}
