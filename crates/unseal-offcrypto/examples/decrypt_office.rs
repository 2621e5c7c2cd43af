//! Decrypt an Agile-encrypted Office file (`.docx` / `.xlsx` / `.pptx` wrapped in OLE/CFB).
//!
//! ## Usage
//!
//! ```bash
//! # Single password, decrypted package to a file
//! cargo run -p unseal-offcrypto --example decrypt_office -- \
//!   --input report.docx --password 'pw' --output report.zip
//!
//! # Try every line of a wordlist, verify the HMAC, write to stdout
//! cargo run -p unseal-offcrypto --example decrypt_office -- \
//!   --input report.docx --wordlist words.txt --verify-integrity > report.zip
//! ```

use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::PathBuf;

use unseal_model::{Decoded, PasswordSource, Source, WordList};
use unseal_offcrypto::{AgileDecoder, DecodeOptions};

fn main() {
    let args = match Args::parse(std::env::args_os().skip(1)) {
        Ok(args) => args,
        Err(ParseOutcome::Help(msg)) => {
            print!("{msg}");
            return;
        }
        Err(ParseOutcome::Error(msg)) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    let mut candidates: Vec<String> = args.password.iter().cloned().collect();
    if let Some(path) = &args.wordlist {
        let words = match File::open(path).and_then(|f| WordList::from_reader(BufReader::new(f))) {
            Ok(words) => words,
            Err(err) => {
                eprintln!("error: failed to read wordlist {}: {err}", path.display());
                std::process::exit(1);
            }
        };
        candidates.extend(words.passwords());
    }
    if candidates.is_empty() {
        candidates.extend(WordList::default().passwords());
    }

    let decoder = AgileDecoder::new(DecodeOptions {
        verify_integrity: args.verify_integrity,
        ..DecodeOptions::default()
    });
    let decoded = match decoder.decode_any(Source::Path(&args.input), &candidates) {
        Ok(decoded) => decoded,
        Err(err) => {
            eprintln!("error: {}: {err}", args.input.display());
            std::process::exit(1);
        }
    };

    let artifact = match decoded {
        Decoded::Artifact(artifact) => artifact,
        Decoded::NotDecryptable { reason } => {
            eprintln!("error: {} is not decryptable: {reason}", args.input.display());
            std::process::exit(1);
        }
        Decoded::WrongPassword => {
            eprintln!("error: none of {} password(s) matched", candidates.len());
            std::process::exit(1);
        }
    };
    if let Some(password) = &artifact.password {
        eprintln!("password: {password}");
    }

    let content = artifact.content.unwrap_or_default();
    let written = match &args.output {
        Some(path) => std::fs::write(path, &content),
        None => std::io::stdout().lock().write_all(&content),
    };
    if let Err(err) = written {
        eprintln!("error: failed to write output: {err}");
        std::process::exit(1);
    }
}

#[derive(Debug, Default)]
struct Args {
    input: PathBuf,
    password: Option<String>,
    wordlist: Option<PathBuf>,
    output: Option<PathBuf>,
    verify_integrity: bool,
}

enum ParseOutcome {
    Help(String),
    Error(String),
}

const USAGE: &str = "\
usage: decrypt_office --input <file> [--password <pw>] [--wordlist <file>] [--output <file>] [--verify-integrity]

Without --password or --wordlist the built-in wordlist is tried.
";

impl Args {
    fn parse(mut argv: impl Iterator<Item = OsString>) -> Result<Self, ParseOutcome> {
        let mut args = Args::default();
        let mut input = None;
        while let Some(flag) = argv.next() {
            let flag = flag.to_string_lossy().into_owned();
            let mut value = |name: &str| {
                argv.next().ok_or_else(|| {
                    ParseOutcome::Error(format!("error: {name} needs a value\n\n{USAGE}"))
                })
            };
            match flag.as_str() {
                "-h" | "--help" => return Err(ParseOutcome::Help(USAGE.to_string())),
                "--input" => input = Some(PathBuf::from(value("--input")?)),
                "--password" => {
                    args.password = Some(value("--password")?.to_string_lossy().into_owned())
                }
                "--wordlist" => args.wordlist = Some(PathBuf::from(value("--wordlist")?)),
                "--output" => args.output = Some(PathBuf::from(value("--output")?)),
                "--verify-integrity" => args.verify_integrity = true,
                other => {
                    return Err(ParseOutcome::Error(format!(
                        "error: unknown argument {other:?}\n\n{USAGE}"
                    )))
                }
            }
        }
        args.input = input
            .ok_or_else(|| ParseOutcome::Error(format!("error: --input is required\n\n{USAGE}")))?;
        Ok(args)
    }
}
