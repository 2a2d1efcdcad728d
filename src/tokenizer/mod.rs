//! Loading of Hugging Face tokenizers from a model identifier

mod sentencepiece;

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tokenizers::{PaddingParams, Tokenizer};

/// Tokens that commonly mark the end of a sequence, in order of preference,
/// for models whose configuration does not say
const WELL_KNOWN_EOS_TOKENS: &[&str] =
    &["</s>", "<|endoftext|>", "<|end_of_text|>", "<eos>", "<|im_end|>"];

/// Number of SentencePiece pieces that are logged when diagnosing a tokenizer
/// loading failure
const DIAGNOSTIC_PIECES: usize = 10;

/// Tokenizer of a model, ready to turn text into token ids and back
#[derive(Clone)]
pub struct TextTokenizer(Tokenizer);
//
impl TextTokenizer {
    /// Load the tokenizer of a model
    ///
    /// `model` can be a `tokenizer.json` file, a model directory that contains
    /// one, or a model identifier on the Hugging Face Hub.
    ///
    /// If loading fails and `model` is a directory with a SentencePiece
    /// `tokenizer.model`, a description of that file is logged before the
    /// error is returned, as a debugging aid.
    pub fn load(model: &str) -> Result<Self> {
        log::info!("Loading tokenizer: {model}");
        let path = Path::new(model);
        let loaded = if path.is_file() {
            Tokenizer::from_file(path)
        } else if path.is_dir() {
            Tokenizer::from_file(path.join("tokenizer.json"))
        } else {
            Tokenizer::from_pretrained(model, None)
        };
        let inner = match loaded {
            Ok(inner) => inner,
            Err(e) => {
                log::error!(
                    "Failed to load tokenizer {model}: {e}, checking for a tokenizer.model file..."
                );
                for line in diagnose_sentencepiece(&path.join("tokenizer.model")) {
                    log::error!("{line}");
                }
                return Err(Error::Tokenizer(format!("loading {model}: {e}")));
            }
        };
        Ok(Self::new(inner, model, model_dir(path)))
    }

    /// Wrap an already loaded tokenizer
    ///
    /// If the tokenizer has no padding token, the end-of-sequence token is
    /// used for padding. It is looked up in the `tokenizer_config.json` of
    /// `config_dir`, if any, then among well-known end-of-sequence tokens.
    pub fn new(mut inner: Tokenizer, model: &str, config_dir: Option<&Path>) -> Self {
        if inner.get_padding().is_none() {
            match eos_token(&inner, config_dir) {
                Some((pad_token, pad_id)) => {
                    log::info!(
                        "Tokenizer has no padding token, \
                         using end-of-sequence token {pad_token:?} instead"
                    );
                    inner.with_padding(Some(PaddingParams {
                        pad_id,
                        pad_token,
                        ..PaddingParams::default()
                    }));
                }
                None => log::warn!(
                    "Tokenizer {model} has neither a padding nor an end-of-sequence token"
                ),
            }
        }
        Self(inner)
    }

    /// Padding token, if any
    pub fn pad_token(&self) -> Option<&str> {
        self.0.get_padding().map(|params| params.pad_token.as_str())
    }

    /// Number of tokens in the vocabulary, including added tokens
    pub fn vocab_size(&self) -> usize {
        self.0.get_vocab_size(true)
    }

    /// Turn text into token ids, adding the model's special tokens
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self.0.encode(text, true).map_err(Error::tokenizer)?;
        Ok(encoding.get_ids().to_vec())
    }

    /// Turn token ids back into text, keeping special tokens
    pub fn decode(&self, ids: &[i64]) -> Result<String> {
        let ids = ids
            .iter()
            .map(|&id| {
                u32::try_from(id).map_err(|_| Error::TokenOutOfRange { id, dtype: "uint32" })
            })
            .collect::<Result<Vec<_>>>()?;
        self.0.decode(&ids, false).map_err(Error::tokenizer)
    }
}

/// Directory where the configuration files of a local model live
fn model_dir(path: &Path) -> Option<&Path> {
    if path.is_dir() {
        Some(path)
    } else if path.is_file() {
        path.parent()
    } else {
        None
    }
}

/// Subset of `tokenizer_config.json` that we care about
#[derive(Debug, Deserialize)]
struct TokenizerConfig {
    /// End of sequence token
    #[serde(default)]
    eos_token: Option<TokenSpec>,
}

/// Special token, as written in `tokenizer_config.json`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TokenSpec {
    /// Bare token text
    Plain(String),

    /// Full added token description, of which we only need the text
    Added { content: String },
}
//
impl TokenSpec {
    /// Text of the token
    fn into_content(self) -> String {
        match self {
            Self::Plain(content) | Self::Added { content } => content,
        }
    }
}

/// Find the end-of-sequence token of a tokenizer and its id
fn eos_token(tokenizer: &Tokenizer, config_dir: Option<&Path>) -> Option<(String, u32)> {
    let configured = config_dir.and_then(|dir| {
        let path = dir.join("tokenizer_config.json");
        let json = std::fs::read(&path).ok()?;
        match serde_json::from_slice::<TokenizerConfig>(&json) {
            Ok(config) => config.eos_token.map(TokenSpec::into_content),
            Err(e) => {
                log::warn!("Ignoring unreadable {}: {e}", path.display());
                None
            }
        }
    });
    configured
        .into_iter()
        .chain(WELL_KNOWN_EOS_TOKENS.iter().map(|token| token.to_string()))
        .find_map(|token| tokenizer.token_to_id(&token).map(|id| (token, id)))
}

/// Describe what we can find out about a SentencePiece model file, one log
/// line at a time
///
/// This is only a debugging aid and never fails.
fn diagnose_sentencepiece(path: &Path) -> Vec<String> {
    let mut lines = vec![format!("Trying to read tokenizer.model file: {}", path.display())];
    if !path.exists() {
        lines.push(format!("File does not exist: {}", path.display()));
        return lines;
    }
    match sentencepiece::read_pieces(path) {
        Ok(pieces) => {
            lines.push(format!("Vocabulary size: {}", pieces.len()));
            lines.push(format!("First {DIAGNOSTIC_PIECES} tokens:"));
            for (id, piece) in pieces.iter().take(DIAGNOSTIC_PIECES).enumerate() {
                lines.push(format!("ID: {id}, Token: {piece}"));
            }
        }
        Err(e) => lines.push(format!("Error during diagnosis: {e}")),
    }
    lines
}

#[cfg(test)]
pub(crate) mod testing {
    //! Small word-level tokenizer that needs no download

    use std::path::Path;

    /// Directory of the checked-in tokenizer, whose vocabulary is
    /// `</s> hello world the quick brown fox .` in id order
    ///
    /// The unknown token is not part of the vocabulary, so any other word
    /// makes encoding fail.
    pub const TOKENIZER: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/tokenizer");

    /// Copy the checked-in tokenizer into `dir`, to add configuration files
    /// next to it
    pub fn copy_tokenizer(dir: &Path) {
        let source = Path::new(TOKENIZER).join("tokenizer.json");
        std::fs::copy(source, dir.join("tokenizer.json")).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::{sentencepiece::testing::model, testing::*, *};

    #[test]
    fn encode_decode_and_padding() {
        let tokenizer = TextTokenizer::load(TOKENIZER).unwrap();
        assert_eq!(tokenizer.pad_token(), Some("</s>"));
        assert_eq!(tokenizer.vocab_size(), 8);

        let ids = tokenizer.encode("hello world").unwrap();
        assert_eq!(ids, vec![1, 2]);
        let ids = ids.into_iter().map(i64::from).collect::<Vec<_>>();
        assert_eq!(tokenizer.decode(&ids).unwrap(), "hello world");
        assert!(tokenizer.encode("unknown words").is_err());
        assert!(matches!(tokenizer.decode(&[-1]), Err(Error::TokenOutOfRange { .. })));
    }

    #[test]
    fn configured_eos_token_wins() {
        let dir = tempfile::tempdir().unwrap();
        copy_tokenizer(dir.path());
        std::fs::write(
            dir.path().join("tokenizer_config.json"),
            r#"{"eos_token": {"content": ".", "lstrip": false}}"#,
        )
        .unwrap();
        let tokenizer = TextTokenizer::load(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(tokenizer.pad_token(), Some("."));
    }

    #[test]
    fn missing_tokenizer_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = TextTokenizer::load(dir.path().to_str().unwrap());
        assert!(matches!(result, Err(Error::Tokenizer(_))));
        let lines = diagnose_sentencepiece(&dir.path().join("tokenizer.model"));
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("File does not exist: "));
    }

    /// Error returned when loading the tokenizer of `dir`
    fn load_error(dir: &Path) -> String {
        match TextTokenizer::load(dir.to_str().unwrap()) {
            Err(Error::Tokenizer(message)) => message,
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("loading should fail"),
        }
    }

    #[test]
    fn sentencepiece_model_is_described_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tokenizer.json"), "not json").unwrap();
        let original = load_error(dir.path());
        assert!(original.starts_with(&format!("loading {}: ", dir.path().display())));

        let pieces = (0..12).map(|id| format!("<tok{id}>")).collect::<Vec<_>>();
        let pieces = pieces.iter().map(String::as_str).collect::<Vec<_>>();
        let model_path = dir.path().join("tokenizer.model");
        std::fs::write(&model_path, model(&pieces)).unwrap();
        assert_eq!(load_error(dir.path()), original);

        let lines = diagnose_sentencepiece(&model_path);
        assert_eq!(lines[1], "Vocabulary size: 12");
        assert_eq!(lines[2], format!("First {DIAGNOSTIC_PIECES} tokens:"));
        assert_eq!(lines.len(), 3 + DIAGNOSTIC_PIECES);
        assert_eq!(lines[3], "ID: 0, Token: <tok0>");
        assert_eq!(lines.last().unwrap(), "ID: 9, Token: <tok9>");
    }

    #[test]
    fn corrupt_sentencepiece_model_keeps_original_error() {
        let dir = tempfile::tempdir().unwrap();
        let original = load_error(dir.path());
        let model_path = dir.path().join("tokenizer.model");
        std::fs::write(&model_path, [0x0a, 42, 1]).unwrap();
        assert_eq!(load_error(dir.path()), original);

        let lines = diagnose_sentencepiece(&model_path);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("Error during diagnosis: "));
        assert!(lines[1].contains("truncated field"));
    }
}
