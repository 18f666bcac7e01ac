//! Audio I/O utilities.
//!
//! WAV in (what the generation daemon writes), MP3 out (what callers receive).

mod mp3;
mod wav;

pub use mp3::{encode_mp3, write_mp3_to};
pub use wav::{DecodedWav, read_wav, read_wav_from, write_wav};
