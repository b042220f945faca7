//! Real-time audio: ring buffers, the duplex streams, and the PCM edges
//! (WAV files in and out, MP3 decoding into the playback ring).

pub mod decode;
pub mod duplex;
pub mod format;
pub mod gate;
pub mod ring_buffer;
pub mod wav;

use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use self::ring_buffer::FrameRing;

/// All audio in the core is 16 kHz mono signed 16-bit PCM.
pub const SAMPLE_RATE: u32 = 16_000;

/// Bytes per PCM frame (one 16-bit mono sample).
pub const BYTES_PER_FRAME: usize = 2;

/// Ring buffer capacity in frames (~16 seconds at 16 kHz).
pub const RING_CAPACITY: usize = 262_144;

/// Detection chunk: 100 ms of samples.
pub const DETECT_CHUNK_FRAMES: usize = 1_600;

/// Sleep interval for all polled waits at the audio boundary.
///
/// The audio callback cannot signal, so waiters on ring-buffer space or
/// data poll at this interval instead of parking on a condvar.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Block-poll write into the playback ring.
///
/// Waits (10 ms polls) for space and writes in as many passes as needed,
/// so sounds longer than the free space still go through. Playback data
/// is never dropped. The mutex serializes this against other non-callback
/// producers; the callback consumer side stays lock-free.
pub fn enqueue_playback(ring: &FrameRing, lock: &Mutex<()>, frames: &[i16]) {
    let mut rest = frames;
    while !rest.is_empty() {
        if ring.write_available() == 0 {
            thread::sleep(POLL_INTERVAL);
            continue;
        }
        let written = {
            let _guard = lock.lock();
            ring.write(rest)
        };
        rest = &rest[written..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_enqueue_playback_fits() {
        let ring = FrameRing::new();
        let lock = Mutex::new(());
        let sound = vec![42i16; 4000];

        enqueue_playback(&ring, &lock, &sound);
        assert_eq!(ring.read_available(), 4000);
    }

    #[test]
    fn test_enqueue_playback_larger_than_ring() {
        // A sound bigger than the ring must still be delivered in full,
        // with a consumer draining concurrently.
        let ring = Arc::new(FrameRing::with_capacity(1024));
        let lock = Arc::new(Mutex::new(()));
        let sound: Vec<i16> = (0..4096).map(|i| i as i16).collect();

        let consumer = {
            let ring = ring.clone();
            std::thread::spawn(move || {
                let mut out = Vec::new();
                let mut buf = [0i16; 256];
                while out.len() < 4096 {
                    let n = ring.read(&mut buf);
                    out.extend_from_slice(&buf[..n]);
                    if n == 0 {
                        std::thread::sleep(Duration::from_millis(1));
                    }
                }
                out
            })
        };

        enqueue_playback(&ring, &lock, &sound);
        let out = consumer.join().unwrap();
        assert_eq!(out, sound);
    }
}
