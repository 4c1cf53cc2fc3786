#![allow(dead_code)]

use gabs_core::gbs::{Gbs, HEADER_SIZE};
use gabs_core::player::GbsPlayer;
use gabs_core::sink::{Sink, StereoFrame};

/// Builder for miniature GBS images used by the scenario tests.
pub struct GbsBuilder {
    n_songs: u8,
    first_song: u8,
    load: u16,
    init: u16,
    play: u16,
    sp: u16,
    timer_modulo: u8,
    timer_control: u8,
    code: Vec<u8>,
}

impl GbsBuilder {
    pub fn new() -> Self {
        GbsBuilder {
            n_songs: 1,
            first_song: 1,
            load: 0x4000,
            init: 0x4000,
            play: 0x4001,
            sp: 0xE000,
            timer_modulo: 0,
            timer_control: 0,
            // init: RET, play: RET
            code: vec![0xC9, 0xC9],
        }
    }

    pub fn songs(mut self, n_songs: u8, first_song: u8) -> Self {
        self.n_songs = n_songs;
        self.first_song = first_song;
        self
    }

    pub fn addresses(mut self, load: u16, init: u16, play: u16, sp: u16) -> Self {
        self.load = load;
        self.init = init;
        self.play = play;
        self.sp = sp;
        self
    }

    pub fn timer(mut self, tma: u8, tac: u8) -> Self {
        self.timer_modulo = tma;
        self.timer_control = tac;
        self
    }

    /// Driver image placed at the load address. `init` and `play` must point
    /// inside it.
    pub fn code(mut self, code: &[u8]) -> Self {
        self.code = code.to_vec();
        self
    }

    pub fn build(self) -> Gbs {
        let mut data = vec![0u8; HEADER_SIZE];
        data[0..4].copy_from_slice(b"GBS\x01");
        data[0x04] = self.n_songs;
        data[0x05] = self.first_song;
        data[0x06..0x08].copy_from_slice(&self.load.to_le_bytes());
        data[0x08..0x0A].copy_from_slice(&self.init.to_le_bytes());
        data[0x0A..0x0C].copy_from_slice(&self.play.to_le_bytes());
        data[0x0C..0x0E].copy_from_slice(&self.sp.to_le_bytes());
        data[0x0E] = self.timer_modulo;
        data[0x0F] = self.timer_control;
        data[0x10..0x19].copy_from_slice(b"gabs test");
        data.extend_from_slice(&self.code);
        Gbs::parse(data.into_boxed_slice()).expect("valid test image")
    }
}

/// Sink discarding every frame.
pub struct NullSink;

impl Sink<StereoFrame> for NullSink {
    fn append(&mut self, _value: StereoFrame) {}
}

/// Sink collecting every frame.
pub struct CollectSink(pub Vec<StereoFrame>);

impl CollectSink {
    pub fn new() -> Self {
        CollectSink(Vec::new())
    }
}

impl Sink<StereoFrame> for CollectSink {
    fn append(&mut self, value: StereoFrame) {
        self.0.push(value);
    }
}

/// Renders and discards `frames` stereo frames of playback.
pub fn run_frames(player: &mut GbsPlayer, frames: usize) {
    let mut sink = NullSink;
    let mut remaining = frames;
    while remaining > 0 {
        player.fill_buffer();
        let drained = player.drain_into(&mut sink, remaining);
        remaining -= drained;
    }
}
