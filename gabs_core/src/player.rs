//! Playback scheduler.
//!
//! Couples the three time bases: the CPU runs one frame per 60 Hz tick, the
//! APU frame sequencer steps at 512 Hz, and the synthesizer emits one stereo
//! sample per tick of the output sample clock. Both dividers are driven from
//! the sample counter with fixed-point accumulators, so no sample drifts.
//!
//! Rendered samples land in a power-of-two ring as interleaved signed L/R
//! bytes. The producer keeps the ring at most half full; the consumer side
//! applies the fadeout envelope and recenters to unsigned on the way out.

use alloc::boxed::Box;

use super::gb::Gameboy;
use super::gbs::Gbs;
use super::sink::{Sink, StereoFrame};
use super::synth::Synth;

/// Size of the sample ring buffer in bytes. Must be a power of two; holds
/// half as many stereo frames.
pub const BUFFER_SIZE: usize = 0x1000;
const BUFFER_MASK: usize = BUFFER_SIZE - 1;

/// Tunable playback constants.
pub struct PlayerConfig {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Seconds of playback before a song starts fading out.
    pub song_length: u16,
    /// Samples of unbroken silence (or driver inactivity) that force a song
    /// advance.
    pub mute_threshold: u32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig {
            sample_rate: super::SAMPLE_RATE,
            song_length: 90,
            mute_threshold: super::SAMPLE_RATE * 4,
        }
    }
}

pub struct GbsPlayer {
    gb: Gameboy,
    gbs: Gbs,
    synth: Synth,
    config: PlayerConfig,
    output: Box<[i8]>,
    read_pos: u16,
    fill_pos: u16,
    song: u8,
    /// 1.0 while playing normally; in (0, 1) while fading, stepped down per
    /// 60 Hz tick; reaching 0 advances to the next song. Set straight to 0
    /// to request an immediate advance.
    fadeout: f32,
    song_time: u16,
    sec_frame: u32,
    gb_frame_accum: u32,
    apu_frame_accum: u32,
    apu_cycle: u8,
    muted_samples: u32,
}

impl GbsPlayer {
    /// Builds a player over the given GBS file and readies its starting
    /// song.
    pub fn power_on(gbs: Gbs) -> Self {
        Self::with_config(gbs, PlayerConfig::default())
    }

    pub fn with_config(gbs: Gbs, config: PlayerConfig) -> Self {
        let gb = Gameboy::power_on(&gbs);
        let synth = Synth::new(config.sample_rate);
        let start = gbs.first_song.saturating_sub(1) % gbs.n_songs;
        let mut player = GbsPlayer {
            gb,
            gbs,
            synth,
            config,
            output: vec![0i8; BUFFER_SIZE].into_boxed_slice(),
            read_pos: 0,
            fill_pos: 0,
            song: 0,
            fadeout: 1.0,
            song_time: 0,
            sec_frame: 0,
            gb_frame_accum: 0,
            apu_frame_accum: 0,
            apu_cycle: 0,
            muted_samples: 0,
        };
        player.play_song(start);
        player
    }

    /// Restarts playback on the given song (taken modulo the song count).
    /// Flushes the ring and resets every per-song counter.
    pub fn play_song(&mut self, song: u8) {
        let song = song % self.gbs.n_songs;
        info!("Playing song {}/{}", song + 1, self.gbs.n_songs);
        self.song = song;
        self.gb.reset(song);
        self.synth.reset();
        self.fadeout = 1.0;
        self.song_time = 0;
        self.sec_frame = 0;
        self.muted_samples = 0;
        self.read_pos = 0;
        self.fill_pos = 0;
        for s in self.output.iter_mut() {
            *s = 0;
        }
        // Both accumulators start saturated so the first sample immediately
        // runs the init frame and an APU step
        self.gb_frame_accum = self.config.sample_rate;
        self.apu_frame_accum = self.config.sample_rate;
        self.apu_cycle = 0;
    }

    /// Advances to the next song, wrapping at the end of the file.
    pub fn next_song(&mut self) {
        let next = (self.song + 1) % self.gbs.n_songs;
        self.play_song(next);
    }

    pub fn song(&self) -> u8 {
        self.song
    }

    pub fn fadeout(&self) -> f32 {
        self.fadeout
    }

    pub fn gbs(&self) -> &Gbs {
        &self.gbs
    }

    pub fn gameboy(&self) -> &Gameboy {
        &self.gb
    }

    pub fn gameboy_mut(&mut self) -> &mut Gameboy {
        &mut self.gb
    }

    pub fn synth(&self) -> &Synth {
        &self.synth
    }

    /// Bytes currently queued between the consumer and producer cursors.
    pub fn buffered(&self) -> usize {
        (self.fill_pos.wrapping_sub(self.read_pos) as usize) & BUFFER_MASK
    }

    /// Produces samples until the ring holds half its capacity. The producer
    /// never fills further, leaving the second half as consumer headroom.
    pub fn fill_buffer(&mut self) {
        while self.buffered() < BUFFER_SIZE / 2 {
            self.step_sample();
        }
    }

    /// Hands buffered samples to the sink, applying the fadeout envelope and
    /// recentering to unsigned. Returns the number of frames delivered.
    pub fn drain_into(&mut self, sink: &mut dyn Sink<StereoFrame>, max_frames: usize) -> usize {
        let mut frames = 0;
        while frames < max_frames && self.read_pos != self.fill_pos {
            let l = self.pop_sample();
            let r = self.pop_sample();
            sink.append((l, r));
            frames += 1;
        }
        frames
    }

    fn pop_sample(&mut self) -> u8 {
        let s = self.output[self.read_pos as usize];
        self.read_pos = ((self.read_pos as usize + 1) & BUFFER_MASK) as u16;
        if self.fadeout == 1.0 {
            (i16::from(s) + 0x80) as u8
        } else {
            ((s as f32 * self.fadeout) as i16 + 0x80) as u8
        }
    }

    /// Renders one stereo sample: advances the song clock, runs a CPU frame
    /// and/or an APU sequencer step when their accumulators roll over, mixes
    /// the channels, and applies the silence bookkeeping.
    fn step_sample(&mut self) {
        let sample_rate = self.config.sample_rate;

        self.sec_frame += 1;
        if self.sec_frame >= sample_rate {
            self.sec_frame -= sample_rate;
            self.song_time += 1;
            if self.song_time == self.config.song_length {
                self.fadeout = 0.999;
            }
        }

        self.gb_frame_accum += 60;
        if self.gb_frame_accum >= sample_rate {
            self.gb_frame_accum -= sample_rate;
            if self.fadeout < 1.0 {
                self.fadeout -= 0.001;
                if self.fadeout <= 0.0 {
                    // Restarts counters and the ring; the frame below runs
                    // the new song's init routine
                    self.next_song();
                }
            }
            self.gb.run_frame();
            self.synth.latch_tables(&self.gb.mmu.apu);
        }

        self.apu_frame_accum += 512;
        if self.apu_frame_accum >= sample_rate {
            self.apu_frame_accum -= sample_rate;
            self.apu_cycle = self.apu_cycle.wrapping_add(1);
            self.gb.mmu.apu.step_sequencer(self.apu_cycle);
        }

        let (l, r) = self.synth.mix(&self.gb.mmu.apu);
        let fill = self.fill_pos as usize;
        self.output[fill] = l;
        self.output[(fill + 1) & BUFFER_MASK] = r;
        self.fill_pos = ((fill + 2) & BUFFER_MASK) as u16;

        if l == 0 && r == 0 {
            self.muted_samples += 1;
            if self.muted_samples >= self.config.mute_threshold {
                self.fadeout = 0.0;
            }
        } else {
            self.muted_samples = 0;
        }
        self.gb.mmu.apu.idle_timer += 1;
        if self.gb.mmu.apu.idle_timer >= self.config.mute_threshold {
            self.fadeout = 0.0;
        }
    }
}
