//! Integration tests for the container codec and the audio model.

use morphstore::container::{ContainerReader, ContainerWriter, Event};
use morphstore::io::{self, ByteInput};
use morphstore::{Audio, AudioBlock, AudioLoadOptions, Error};

fn write_example(path: &std::path::Path) {
    let mut writer = ContainerWriter::create(path, "T1", 7).unwrap();
    writer.begin_section("h").unwrap();
    writer.write_int("x", 5).unwrap();
    writer.write_float("y", 2.5).unwrap();
    writer.write_blob("b", &[1, 2, 3]).unwrap();
    writer.end_section().unwrap();
    writer.write_blob("b2", &[1, 2, 3]).unwrap();
    writer.finish().unwrap();
}

fn check_example(mut reader: ContainerReader) {
    assert_eq!(reader.file_type(), "T1");
    assert_eq!(reader.file_version(), 7);

    assert_eq!(reader.event(), &Event::BeginSection("h".to_string()));
    assert_eq!(
        reader.next_event(),
        &Event::Int { name: "x".to_string(), value: 5 }
    );
    assert_eq!(
        reader.next_event(),
        &Event::Float { name: "y".to_string(), value: 2.5 }
    );
    assert!(matches!(reader.next_event(), Event::Blob { name, len: 3, .. } if name == "b"));
    assert_eq!(reader.read_blob(), Some(vec![1, 2, 3]));
    assert_eq!(reader.next_event(), &Event::EndSection);
    assert!(matches!(reader.next_event(), Event::BlobRef { name, .. } if name == "b2"));
    assert_eq!(reader.read_blob(), Some(vec![1, 2, 3]));
    assert_eq!(reader.next_event(), &Event::EndOfFile);
    assert_eq!(reader.next_event(), &Event::EndOfFile);
}

#[test]
fn test_example_stream_all_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("example.t1");
    write_example(&path);

    let raw = std::fs::read(&path).unwrap();
    assert_eq!(raw.windows(3).filter(|w| w == &[1, 2, 3]).count(), 1);
    assert_eq!(raw.last(), Some(&b'Z'));

    check_example(ContainerReader::open(&path).unwrap());
    check_example(ContainerReader::new(io::open_with_mmap(&path, true).unwrap()));
    check_example(ContainerReader::new(io::open_with_mmap(&path, false).unwrap()));
    check_example(ContainerReader::from_bytes(raw));
}

#[test]
fn test_no_mmap_env_selects_buffered_input() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("example.t1");
    write_example(&path);

    std::env::set_var(io::NO_MMAP_ENV, "1");
    let input = io::open(&path);
    std::env::remove_var(io::NO_MMAP_ENV);

    let input = input.unwrap();
    assert!(input.mmap_view().is_none());
    check_example(ContainerReader::new(input));
}

#[test]
fn test_open_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        ContainerReader::open(dir.path().join("missing")),
        Err(Error::FileNotFound(_))
    ));
}

#[test]
fn test_writer_dropped_early_still_terminates_stream() {
    fn write_partial(path: &std::path::Path) -> morphstore::Result<()> {
        let mut writer = ContainerWriter::create(path, "T1", 1)?;
        writer.write_int("a", 1)?;
        Err(Error::Encode("giving up".to_string()))
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.t1");
    assert!(write_partial(&path).is_err());

    let mut reader = ContainerReader::open(&path).unwrap();
    assert_eq!(reader.event(), &Event::Int { name: "a".to_string(), value: 1 });
    assert_eq!(reader.next_event(), &Event::EndOfFile);
}

fn test_audio(frames: usize) -> Audio {
    Audio {
        mix_freq: 44100.0,
        frame_size_ms: 40.0,
        frame_step_ms: 10.0,
        fundamental_freq: 261.6,
        zeropad: 4,
        original_samples: (0..1000).map(|i| (i as f32 * 0.01).sin()).collect(),
        contents: (0..frames)
            .map(|f| AudioBlock {
                freqs: vec![f as u16; 20],
                mags: vec![1000; 20],
                phases: vec![7; 20],
                noise: vec![3; 32],
                original_fft: vec![0.5; 128],
                debug_samples: vec![0.25; 128],
            })
            .collect(),
        ..Default::default()
    }
}

#[test]
fn test_audio_file_round_trip_all_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("note.sm");
    let audio = test_audio(50);
    audio.save_file(&path).unwrap();

    assert_eq!(Audio::load_file(&path).unwrap(), audio);
    assert_eq!(Audio::load(io::open_with_mmap(&path, false).unwrap()).unwrap(), audio);
}

#[test]
fn test_audio_skip_debug_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("note.sm");
    test_audio(10).save_file(&path).unwrap();

    let options = AudioLoadOptions { skip_debug: true };
    for allow_mmap in [true, false] {
        let input = io::open_with_mmap(&path, allow_mmap).unwrap();
        let loaded = Audio::load_with_options(input, options).unwrap();
        assert_eq!(loaded.contents.len(), 10);
        assert!(loaded.contents.iter().all(|b| b.debug_samples.is_empty()));
        assert_eq!(loaded.contents[9].freqs, vec![9; 20]);
    }
}

#[test]
fn test_audio_truncated_file_never_panics() {
    let data = test_audio(3).to_bytes().unwrap();
    for cut in (0..data.len()).step_by(7) {
        assert!(Audio::from_bytes(data[..cut].to_vec()).is_err(), "cut at {}", cut);
    }
}
