// MIDI boundary: Standard MIDI Files to note events and back.
//
// Parsing (`parse_midi`):
// - Tick times are converted to seconds through a tempo map merged from all
//   tracks (Format 1 files usually keep tempo in track 0). Before the first
//   tempo event the tempo is 120 BPM. SMPTE timecode files convert directly
//   using frames-per-second x subframes as the tick rate.
// - Only the first instrument is used: the first track that has a completed
//   note, and within it the channel whose first note-on comes first.
// - Note-on with velocity 0 is a note-off. A note-off closes every open note
//   of its channel and pitch that started on an earlier tick. Notes that
//   started on the note-off's own tick stay open if something else was
//   closed, and are dropped otherwise. Notes never closed are dropped.
//
// Writing (`write_midi`): a single-track SMF (Format 0) holding a track name,
// tempo, one program change, then note on/off pairs at 480 ticks per quarter.
// At the same tick, note-offs are written before note-ons so a repeated pitch
// re-attacks instead of being cut off. A note that rounds to zero ticks gets
// one tick so its note-off cannot precede its note-on.
//
// Uses the `midly` crate for SMF parsing and writing.

use crate::config::MidiConfig;
use crate::error::{Error, Result};
use crate::features::Note;
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

/// Ticks per quarter note in MIDI output.
const TICKS_PER_QUARTER: u16 = 480;

/// Tempo assumed until the file sets one (120 BPM).
const DEFAULT_TEMPO_US: u32 = 500_000;

/// Largest delta a track event can carry (28-bit VLQ).
const MAX_DELTA: u32 = 0x0FFF_FFFF;

/// Channel all output notes are written on.
const OUTPUT_CHANNEL: u8 = 0;

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Tick-to-seconds conversion for one file.
enum Clock {
    /// Piecewise-constant tempo: (start tick, seconds at that tick, µs per quarter).
    Metrical {
        ticks_per_quarter: f64,
        segments: Vec<(u64, f64, f64)>,
    },
    Timecode {
        ticks_per_second: f64,
    },
}

impl Clock {
    fn from_smf(smf: &Smf) -> Self {
        match smf.header.timing {
            Timing::Metrical(tpq) => {
                let mut changes: Vec<(u64, u32)> = Vec::new();
                for track in &smf.tracks {
                    let mut tick = 0u64;
                    for event in track {
                        tick += event.delta.as_int() as u64;
                        if let TrackEventKind::Meta(MetaMessage::Tempo(t)) = &event.kind {
                            changes.push((tick, t.as_int()));
                        }
                    }
                }
                // Stable sort keeps file order for simultaneous changes; the
                // later one wins below.
                changes.sort_by_key(|&(tick, _)| tick);
                Clock::metrical(tpq.as_int() as f64, &changes)
            }
            Timing::Timecode(fps, subframes) => {
                let frames_per_second = match fps {
                    midly::Fps::Fps24 => 24.0,
                    midly::Fps::Fps25 => 25.0,
                    midly::Fps::Fps29 => 29.97,
                    midly::Fps::Fps30 => 30.0,
                };
                Clock::Timecode {
                    ticks_per_second: frames_per_second * subframes.max(1) as f64,
                }
            }
        }
    }

    fn metrical(ticks_per_quarter: f64, changes: &[(u64, u32)]) -> Self {
        let ticks_per_quarter = ticks_per_quarter.max(1.0);
        let mut current = (0u64, 0.0f64, DEFAULT_TEMPO_US as f64);
        let mut segments = Vec::with_capacity(changes.len() + 1);
        for &(tick, us) in changes {
            let (seg_tick, seg_secs, seg_us) = current;
            let secs = seg_secs + (tick - seg_tick) as f64 / ticks_per_quarter * seg_us / 1e6;
            if tick > seg_tick {
                segments.push(current);
            }
            current = (tick, secs, us as f64);
        }
        segments.push(current);
        Clock::Metrical {
            ticks_per_quarter,
            segments,
        }
    }

    fn seconds(&self, tick: u64) -> f64 {
        match self {
            Clock::Metrical {
                ticks_per_quarter,
                segments,
            } => {
                let idx = segments.partition_point(|&(t, _, _)| t <= tick).saturating_sub(1);
                let (seg_tick, seg_secs, seg_us) = segments[idx];
                seg_secs + (tick - seg_tick) as f64 / ticks_per_quarter * seg_us / 1e6
            }
            Clock::Timecode { ticks_per_second } => tick as f64 / ticks_per_second,
        }
    }
}

/// Notes from one track, grouped by channel in order of first note-on.
struct TrackNotes {
    channel_order: Vec<u8>,
    by_channel: HashMap<u8, Vec<Note>>,
}

fn collect_track(track: &Track, clock: &Clock) -> TrackNotes {
    let mut channel_order = Vec::new();
    let mut by_channel: HashMap<u8, Vec<Note>> = HashMap::new();
    // (channel, pitch) -> [(start tick, start seconds, velocity)]
    let mut open: HashMap<(u8, u8), Vec<(u64, f64, u8)>> = HashMap::new();
    let mut dropped = 0usize;
    let mut tick = 0u64;

    for event in track {
        tick += event.delta.as_int() as u64;
        let TrackEventKind::Midi { channel, message } = &event.kind else {
            continue;
        };
        let channel = channel.as_int();
        let time = clock.seconds(tick);

        match message {
            MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                if !channel_order.contains(&channel) {
                    channel_order.push(channel);
                }
                open.entry((channel, key.as_int()))
                    .or_default()
                    .push((tick, time, vel.as_int()));
            }
            MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                let pitch = key.as_int();
                let Some(pending) = open.remove(&(channel, pitch)) else {
                    continue;
                };
                let (same_tick, earlier): (Vec<_>, Vec<_>) =
                    pending.into_iter().partition(|&(start_tick, _, _)| start_tick == tick);
                let notes = by_channel.entry(channel).or_default();
                for &(_, start, velocity) in &earlier {
                    notes.push(Note {
                        pitch,
                        start,
                        end: time,
                        velocity,
                    });
                }
                if earlier.is_empty() {
                    dropped += same_tick.len();
                } else if !same_tick.is_empty() {
                    open.insert((channel, pitch), same_tick);
                }
            }
            _ => {}
        }
    }

    dropped += open.values().map(Vec::len).sum::<usize>();
    if dropped > 0 {
        debug!("Dropped {} unterminated note(s)", dropped);
    }

    TrackNotes {
        channel_order,
        by_channel,
    }
}

/// Parse an SMF and return the first instrument's notes, sorted by onset.
pub fn parse_midi(data: &[u8]) -> Result<Vec<Note>> {
    let smf = Smf::parse(data)?;
    let clock = Clock::from_smf(&smf);

    debug!("Parsing MIDI file: {} track(s)", smf.tracks.len());

    for (track_index, track) in smf.tracks.iter().enumerate() {
        let mut track_notes = collect_track(track, &clock);
        for channel in &track_notes.channel_order {
            if let Some(mut notes) = track_notes.by_channel.remove(channel) {
                if notes.is_empty() {
                    continue;
                }
                notes.sort_by(|a, b| a.start.total_cmp(&b.start));
                debug!(
                    "Using track {} channel {}: {} notes",
                    track_index,
                    channel,
                    notes.len()
                );
                return Ok(notes);
            }
        }
    }

    Err(Error::MidiUnsupported(
        "no completed notes in any track".into(),
    ))
}

/// Read and parse a MIDI file from disk.
pub fn load_notes(path: &Path) -> Result<Vec<Note>> {
    let data = std::fs::read(path)?;
    parse_midi(&data)
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Serialise notes into a single-track SMF.
pub fn write_midi(notes: &[Note], config: &MidiConfig) -> Result<Vec<u8>> {
    config.validate()?;
    let smf = notes_to_smf(notes, config)?;
    let mut buf = Vec::new();
    smf.write_std(&mut buf)?;
    Ok(buf)
}

/// Serialise notes and write them to `path`.
pub fn save_notes(path: &Path, notes: &[Note], config: &MidiConfig) -> Result<()> {
    let buf = write_midi(notes, config)?;
    std::fs::write(path, &buf)?;
    Ok(())
}

fn notes_to_smf(notes: &[Note], config: &MidiConfig) -> Result<Smf<'static>> {
    let ticks_per_second = TICKS_PER_QUARTER as f64 * config.tempo_bpm / 60.0;
    let to_tick = |seconds: f64| -> Result<u64> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(Error::Midi(format!("cannot write note time {seconds}")));
        }
        Ok((seconds * ticks_per_second).round() as u64)
    };

    // (tick, note-off before note-on, pitch, velocity)
    let mut events: BTreeMap<(u64, bool, usize), (u8, u8)> = BTreeMap::new();
    for (i, note) in notes.iter().enumerate() {
        if note.pitch > 127 || note.velocity == 0 || note.velocity > 127 {
            return Err(Error::Midi(format!(
                "note {i} has pitch {} / velocity {} outside MIDI range",
                note.pitch, note.velocity
            )));
        }
        let on = to_tick(note.start)?;
        let off = to_tick(note.end)?.max(on + 1);
        events.insert((on, true, i), (note.pitch, note.velocity));
        events.insert((off, false, i), (note.pitch, 0));
    }

    let channel = u4::new(OUTPUT_CHANNEL);
    let mut track: Track<'static> = Vec::with_capacity(events.len() + 4);
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(b"Cadenza")),
    });
    let tempo_us = (60_000_000.0 / config.tempo_bpm).round() as u32;
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo_us))),
    });
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Midi {
            channel,
            message: MidiMessage::ProgramChange {
                program: u7::new(config.program),
            },
        },
    });

    let mut last_tick = 0u64;
    for ((tick, is_on, _), (pitch, velocity)) in events {
        let delta = tick - last_tick;
        if delta > MAX_DELTA as u64 {
            return Err(Error::Midi(format!(
                "gap of {delta} ticks exceeds the MIDI delta-time limit"
            )));
        }
        let message = if is_on {
            MidiMessage::NoteOn {
                key: u7::new(pitch),
                vel: u7::new(velocity),
            }
        } else {
            MidiMessage::NoteOff {
                key: u7::new(pitch),
                vel: u7::new(0),
            }
        };
        track.push(TrackEvent {
            delta: u28::new(delta as u32),
            kind: TrackEventKind::Midi { channel, message },
        });
        last_tick = tick;
    }

    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let mut smf = Smf::new(Header::new(
        Format::SingleTrack,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));
    smf.tracks.push(track);
    Ok(smf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn event(delta: u32, kind: TrackEventKind<'static>) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind,
        }
    }

    fn note_on(channel: u8, key: u8, vel: u8) -> TrackEventKind<'static> {
        TrackEventKind::Midi {
            channel: u4::new(channel),
            message: MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(vel),
            },
        }
    }

    fn encode_smf(format: Format, tracks: Vec<Track<'static>>) -> Vec<u8> {
        let mut smf = Smf::new(Header::new(format, Timing::Metrical(u15::new(480))));
        smf.tracks = tracks;
        let mut buf = Vec::new();
        smf.write_std(&mut buf).unwrap();
        buf
    }

    #[test]
    fn parse_empty_file_is_unsupported() {
        // Minimal valid MIDI file (header + empty track).
        let data = [
            0x4D, 0x54, 0x68, 0x64, 0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0x01, 0x01, 0xE0,
            0x4D, 0x54, 0x72, 0x6B, 0x00, 0x00, 0x00, 0x04, 0x00, 0xFF, 0x2F, 0x00,
        ];
        assert!(matches!(parse_midi(&data), Err(Error::MidiUnsupported(_))));
    }

    #[test]
    fn parse_garbage_is_a_midi_error() {
        assert!(matches!(parse_midi(b"not a midi file"), Err(Error::Midi(_))));
    }

    #[test]
    fn tempo_map_converts_ticks_to_seconds() {
        // Tempo track: 120 BPM, then 60 BPM from beat 2.
        let tempo = vec![
            event(0, TrackEventKind::Meta(MetaMessage::Tempo(u24::new(500_000)))),
            event(960, TrackEventKind::Meta(MetaMessage::Tempo(u24::new(1_000_000)))),
            event(0, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
        ];
        // Note at beat 0 for one beat, then a note from beat 2 to beat 3.
        let notes = vec![
            event(0, note_on(0, 60, 90)),
            event(480, note_on(0, 60, 0)),
            event(480, note_on(0, 62, 90)),
            event(480, note_on(0, 62, 0)),
            event(0, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
        ];
        let data = encode_smf(Format::Parallel, vec![tempo, notes]);
        let parsed = parse_midi(&data).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_relative_eq!(parsed[0].end, 0.5, epsilon = 1e-9);
        assert_relative_eq!(parsed[1].start, 1.0, epsilon = 1e-9);
        assert_relative_eq!(parsed[1].end, 2.0, epsilon = 1e-9);
        assert_eq!(parsed[0].velocity, 90);
    }

    #[test]
    fn first_instrument_only() {
        let track = vec![
            event(0, note_on(3, 50, 80)),
            event(0, note_on(1, 70, 80)),
            event(240, note_on(1, 70, 0)),
            event(0, note_on(3, 50, 0)),
            event(0, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
        ];
        let data = encode_smf(Format::SingleTrack, vec![track]);
        let parsed = parse_midi(&data).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].pitch, 50);
    }

    #[test]
    fn note_off_closes_every_earlier_note_of_its_pitch() {
        let track = vec![
            event(0, note_on(0, 60, 80)),
            event(120, note_on(0, 60, 81)),
            event(120, note_on(0, 60, 0)),
            event(0, note_on(0, 64, 80)),
            event(0, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
        ];
        let data = encode_smf(Format::SingleTrack, vec![track]);
        let parsed = parse_midi(&data).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].velocity, 80);
        assert_eq!(parsed[1].velocity, 81);
        assert_relative_eq!(parsed[0].start, 0.0, epsilon = 1e-9);
        assert_relative_eq!(parsed[1].start, 0.125, epsilon = 1e-9);
        assert_relative_eq!(parsed[0].end, 0.25, epsilon = 1e-9);
        assert_relative_eq!(parsed[1].end, 0.25, epsilon = 1e-9);
    }

    #[test]
    fn note_started_on_the_off_tick_survives_only_beside_a_closed_note() {
        let track = vec![
            // Re-attack: the new 60 starts on the tick that ends the old one.
            event(0, note_on(0, 60, 80)),
            event(240, note_on(0, 60, 90)),
            event(0, note_on(0, 60, 0)),
            event(240, note_on(0, 60, 0)),
            // Zero-length 64 is dropped.
            event(0, note_on(0, 64, 80)),
            event(0, note_on(0, 64, 0)),
            event(0, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
        ];
        let data = encode_smf(Format::SingleTrack, vec![track]);
        let parsed = parse_midi(&data).unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(parsed.iter().all(|n| n.pitch == 60));
        assert_relative_eq!(parsed[0].end, 0.25, epsilon = 1e-9);
        assert_relative_eq!(parsed[1].start, 0.25, epsilon = 1e-9);
        assert_relative_eq!(parsed[1].end, 0.5, epsilon = 1e-9);
        assert_eq!(parsed[1].velocity, 90);
    }

    #[test]
    fn write_then_parse_preserves_notes() {
        let notes = vec![
            Note::new(60, 0.0, 0.5, 100),
            Note::new(60, 0.5, 1.0, 100),
            Note::new(67, 1.0, 1.3, 100),
        ];
        let data = write_midi(&notes, &MidiConfig::default()).unwrap();
        let parsed = parse_midi(&data).unwrap();
        assert_eq!(parsed.len(), 3);
        for (a, b) in notes.iter().zip(&parsed) {
            assert_eq!(a.pitch, b.pitch);
            assert_eq!(b.velocity, 100);
            // One tick at 120 BPM is ~1ms.
            assert_relative_eq!(a.start, b.start, epsilon = 1e-3);
            assert_relative_eq!(a.end, b.end, epsilon = 1e-3);
        }
    }

    #[test]
    fn written_file_is_single_track_with_program() {
        let config = MidiConfig {
            program: 40,
            ..Default::default()
        };
        let data = write_midi(&[Note::new(60, 0.0, 0.0, 100)], &config).unwrap();
        let smf = Smf::parse(&data).unwrap();
        assert_eq!(smf.header.format, Format::SingleTrack);
        assert_eq!(smf.tracks.len(), 1);
        let program = smf.tracks[0].iter().find_map(|e| match &e.kind {
            TrackEventKind::Midi {
                message: MidiMessage::ProgramChange { program },
                ..
            } => Some(program.as_int()),
            _ => None,
        });
        assert_eq!(program, Some(40));
        // A zero-length note still gets a note-off after its note-on.
        let parsed = parse_midi(&data).unwrap();
        assert!(parsed[0].end > parsed[0].start);
    }

    #[test]
    fn write_rejects_invalid_notes() {
        let config = MidiConfig::default();
        assert!(write_midi(&[Note::new(130, 0.0, 1.0, 100)], &config).is_err());
        assert!(write_midi(&[Note::new(60, f64::NAN, 1.0, 100)], &config).is_err());
        assert!(write_midi(&[Note::new(60, 0.0, 1.0, 0)], &config).is_err());
    }

    #[test]
    fn save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mid");
        save_notes(&path, &[Note::new(72, 0.25, 0.75, 100)], &MidiConfig::default()).unwrap();
        let loaded = load_notes(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].pitch, 72);
    }
}
