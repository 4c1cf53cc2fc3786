mod audio_driver;

use gabs_core::gbs::Gbs;
use gabs_core::player::{GbsPlayer, PlayerConfig};
use gabs_core::sink::{Sink, SinkRef, StereoFrame};
use gabs_core::SAMPLE_RATE;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use clap::{App, Arg};

/// Extra frames kept queued ahead of the device clock.
const LATENCY_MS: u32 = 100;

struct VecSink(Vec<StereoFrame>);

impl Sink<StereoFrame> for VecSink {
    fn append(&mut self, value: StereoFrame) {
        self.0.push(value);
    }
}

fn main() {
    env_logger::init();
    let matches = App::new("GABS")
        .version("0.1")
        .author("Joe Thill <rocketlobster42@gmail.com>")
        .about("Gameboy Sound player in Rust")
        .arg(
            Arg::with_name("FILE")
                .value_name("FILE")
                .help("Music rip in GBS format")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name("song")
                .help("Track to start playback on, 1-based")
                .short("s")
                .long("song")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("length")
                .help("Seconds before each track fades out")
                .short("l")
                .long("length")
                .takes_value(true),
        )
        .get_matches();

    let gbs_file = matches.value_of("FILE").unwrap();
    let gbs = load_gbs(gbs_file).expect("Failed to read GBS file");

    println!("{} - {} ({})", gbs.title, gbs.author, gbs.copyright);
    println!("{} track(s)", gbs.n_songs);

    let mut config = PlayerConfig::default();
    if let Some(length) = matches.value_of("length") {
        config.song_length = length.parse().expect("Invalid track length");
    }

    let mut player = GbsPlayer::with_config(gbs, config);
    if let Some(song) = matches.value_of("song") {
        let song: u8 = song.parse().expect("Invalid track number");
        player.play_song(song.saturating_sub(1));
    }

    let audio_driver = audio_driver::AudioDriver::new(SAMPLE_RATE, LATENCY_MS);
    let mut audio_sink = audio_driver.sink();
    let time_source = audio_driver.time_source();

    let latency_frames = u64::from(SAMPLE_RATE * LATENCY_MS / 1000);
    let mut pushed_frames: u64 = 0;
    let mut current_track = player.song();
    println!("Now playing track {}", current_track + 1);

    loop {
        // Track the device clock, staying one latency window ahead
        let target_frames =
            time_source.time_ns() * u64::from(SAMPLE_RATE) / 1_000_000_000 + latency_frames;
        while pushed_frames < target_frames {
            player.fill_buffer();
            let mut chunk = VecSink(Vec::with_capacity(1024));
            let drained = player.drain_into(&mut chunk, 1024);
            if drained == 0 {
                break;
            }
            audio_sink.append(&chunk.0);
            pushed_frames += drained as u64;
        }

        if player.song() != current_track {
            current_track = player.song();
            println!("Now playing track {}", current_track + 1);
        }

        spin_sleep::sleep(std::time::Duration::from_millis(1));
    }
}

fn load_gbs(path: impl AsRef<Path>) -> std::io::Result<Gbs> {
    let mut f = File::open(path.as_ref())?;
    let mut data = Vec::new();
    f.read_to_end(&mut data)?;
    Gbs::parse(data.into_boxed_slice())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
}
