// End-to-end continuation: seed MIDI bytes in, continued MIDI bytes out.
//
// parse -> validate -> encode -> generate -> decode -> write
//
// Both the CLI and the HTTP server call this, so both behave the same way. Any
// failure aborts the whole request and the caller gets a single `Error`.

use crate::config::CadenzaConfig;
use crate::decoder::decode;
use crate::encoder::{encode, validate_seed};
use crate::error::Result;
use crate::features::Note;
use crate::generator::{CancelToken, generate};
use crate::midi::{parse_midi, write_midi};
use crate::model::Models;
use cadenza_prng::SampleRng;
use tracing::debug;

/// Output of a continuation run.
#[derive(Debug, Clone)]
pub struct Continuation {
    /// The SMF bytes of seed plus generated notes.
    pub midi: Vec<u8>,
    /// All decoded notes, seed first.
    pub notes: Vec<Note>,
    /// How many leading notes came from the seed.
    pub seed_notes: usize,
}

impl Continuation {
    pub fn generated_notes(&self) -> usize {
        self.notes.len() - self.seed_notes
    }
}

/// Run the full pipeline on already-parsed seed notes.
pub fn continue_notes(
    seed: &[Note],
    models: &Models,
    config: &CadenzaConfig,
    rng: &mut SampleRng,
    cancel: &CancelToken,
) -> Result<Continuation> {
    config.validate()?;
    let generation = &config.generation;
    let range = generation.pitch_range;

    validate_seed(seed, &range, generation.strict_pitch_range)?;
    let features = encode(seed, generation.max_notes, &range);
    let seed_notes = features.len();

    let generated = generate(&features, models, generation, rng, cancel)?;
    let notes = decode(&generated, &range, config.midi.velocity);
    let midi = write_midi(&notes, &config.midi)?;

    debug!(
        "Continuation complete: {} seed + {} generated notes, {} bytes",
        seed_notes,
        notes.len() - seed_notes,
        midi.len()
    );
    Ok(Continuation {
        midi,
        notes,
        seed_notes,
    })
}

/// Parse a seed MIDI file and continue it.
pub fn continue_melody(
    midi: &[u8],
    models: &Models,
    config: &CadenzaConfig,
    rng: &mut SampleRng,
    cancel: &CancelToken,
) -> Result<Continuation> {
    let seed = parse_midi(midi)?;
    continue_notes(&seed, models, config, rng, cancel)
}
