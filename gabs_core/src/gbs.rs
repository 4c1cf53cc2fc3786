//! Parsing of the GBS (Game Boy Sound) container format.
//!
//! A GBS file wraps a sound-driver code image together with the entry points
//! the player needs: where to load the image, where the per-song init routine
//! lives, and where the play routine that runs once per frame lives.

use alloc::boxed::Box;
use alloc::string::String;
use core::fmt;

/// Size of the fixed GBS header preceding the driver image.
pub const HEADER_SIZE: usize = 0x70;

/// Errors raised while parsing a GBS container.
#[derive(Debug, PartialEq)]
pub enum GbsError {
    /// The file does not start with the `GBS` identifier.
    BadMagic,
    /// The file is smaller than the fixed header.
    Truncated(usize),
    /// The header declares zero songs.
    NoSongs,
}

impl fmt::Display for GbsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GbsError::BadMagic => write!(f, "missing GBS file identifier"),
            GbsError::Truncated(len) => {
                write!(f, "file too small for a GBS header ({} bytes)", len)
            }
            GbsError::NoSongs => write!(f, "GBS header declares zero songs"),
        }
    }
}

impl core::error::Error for GbsError {}

/// A parsed GBS file: header fields, metadata and the driver image.
#[derive(Debug)]
pub struct Gbs {
    /// GBS format version, byte 0x03.
    pub version: u8,
    /// Number of songs in the file.
    pub n_songs: u8,
    /// First song to play, 1-based as stored in the file.
    pub first_song: u8,
    /// Address the driver image is loaded at.
    pub load_address: u16,
    /// Entry point of the per-song init routine (song index in A).
    pub init_address: u16,
    /// Entry point of the play routine, run once per frame.
    pub play_address: u16,
    /// Initial stack pointer.
    pub stack_pointer: u16,
    /// Initial TMA value.
    pub timer_modulo: u8,
    /// Initial TAC value. Bit 2 selects timer-driven playback.
    pub timer_control: u8,
    pub title: String,
    pub author: String,
    pub copyright: String,
    data: Box<[u8]>,
}

impl Gbs {
    /// Parses the given file image as a GBS container.
    pub fn parse(data: Box<[u8]>) -> Result<Self, GbsError> {
        if data.len() < HEADER_SIZE {
            return Err(GbsError::Truncated(data.len()));
        }
        if &data[0..3] != b"GBS" {
            return Err(GbsError::BadMagic);
        }
        let n_songs = data[0x04];
        if n_songs == 0 {
            return Err(GbsError::NoSongs);
        }
        let gbs = Gbs {
            version: data[0x03],
            n_songs,
            first_song: data[0x05],
            load_address: u16::from_le_bytes([data[0x06], data[0x07]]),
            init_address: u16::from_le_bytes([data[0x08], data[0x09]]),
            play_address: u16::from_le_bytes([data[0x0A], data[0x0B]]),
            stack_pointer: u16::from_le_bytes([data[0x0C], data[0x0D]]),
            timer_modulo: data[0x0E],
            timer_control: data[0x0F],
            title: header_string(&data[0x10..0x30]),
            author: header_string(&data[0x30..0x50]),
            copyright: header_string(&data[0x50..0x70]),
            data,
        };
        info!("GBS Info:");
        info!("\tTitle: {}", gbs.title);
        info!("\tAuthor: {}", gbs.author);
        info!("\tCopyright: {}", gbs.copyright);
        info!(
            "\tSongs: {} (starting at {})",
            gbs.n_songs, gbs.first_song
        );
        info!(
            "\tLoad: {:04X} Init: {:04X} Play: {:04X} SP: {:04X}",
            gbs.load_address, gbs.init_address, gbs.play_address, gbs.stack_pointer
        );
        Ok(gbs)
    }

    /// The driver code image following the header, to be copied to
    /// `load_address`.
    pub fn payload(&self) -> &[u8] {
        &self.data[HEADER_SIZE..]
    }
}

/// Decodes a fixed-size NUL-padded ASCII metadata field.
fn header_string(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}
