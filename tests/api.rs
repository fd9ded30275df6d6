use std::path::Path;

use bdf_rs::attributes::keys;
use bdf_rs::envelope::segments;
use bdf_rs::{
    BdfError, Container, ErrorCode, GroupHandle, GroupSettings, InputHeader, OperationMode,
    WriterOptions,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn options() -> WriterOptions {
    WriterOptions {
        reduction_factor: 4,
        max_reductions: 3,
        transfer_size: 64,
        sync_on_close: true,
    }
}

fn sample(g: u32, i: u32, b: u32, k: u32) -> i16 {
    ((g * 1000 + i * 100 + b * 10 + k * 7) % 2000) as i16 - 1000
}

fn to_bytes(words: &[i16]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

fn block_words(g: u32, i: u32, b: u32, n: u32) -> Vec<i16> {
    (0..n).map(|k| sample(g, i, b, k)).collect()
}

/// Stream one block in two uneven chunks and finalize it.
fn stream_block(
    c: &mut Container,
    g: GroupHandle,
    input: u32,
    block: u32,
    bytes: &[u8],
    trigger_ps: u64,
) -> Result<(), BdfError> {
    let s = c.init_input_streamer(0, input, block, g)?;
    let split = 33.min(bytes.len());
    c.write_data(s, &bytes[..split], g)?;
    c.write_data(s, &bytes[split..], g)?;
    c.write_eor_info(block, trigger_ps, bytes.len() as u64, input, 0, g)
}

#[test]
fn multi_group_roundtrip() -> Result<(), BdfError> {
    init_logging();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("run.bdf");
    let mut c = Container::with_output(&path, options())?;

    let mut handles = Vec::new();
    for g in 0..2u32 {
        let mut settings = GroupSettings::new(g + 10, OperationMode::Continuous, 1e6 * (g + 1) as f64);
        settings.trigger_sample = 5;
        let h = c.init_file_writer(&settings)?;
        for i in 0..2u32 {
            c.write_input_header(&InputHeader::new(0, i, 10.0), h)?;
        }
        handles.push(h);
    }
    for b in 0..3u32 {
        for (g, &h) in handles.iter().enumerate() {
            for i in 0..2u32 {
                let words = block_words(g as u32, i, b, 100);
                stream_block(&mut c, h, i, b, &to_bytes(&words), 1_500_000)?;
            }
        }
    }
    c.close_file(GroupHandle::DEFAULT)?;
    assert!(path.exists());
    assert!(!path.with_extension("tmp").exists());

    let mut r = Container::new();
    r.load_file(&path)?;
    assert_eq!(r.number_of_groups()?, 2);
    for g in 0..2usize {
        assert_eq!(r.operation_mode(g)?, OperationMode::Continuous);
        assert_eq!(r.number_of_inputs(g)?, 2);
        for i in 0..2usize {
            assert_eq!(r.number_of_blocks(g, i)?, 3);
            let info = r.input_info(g, i)?;
            assert_eq!(info.bytes_per_sample, 2);
            assert_eq!(info.input_number, i as u32);
            let scaling = info.scaling();
            for b in 0..3usize {
                let expected = block_words(g as u32, i as u32, b as u32, 100);
                let block = r.block_info(g, i, b)?;
                assert_eq!(block.block_length, 100);
                assert_eq!(block.sample_rate_hertz, 1e6 * (g + 1) as f64);
                assert_eq!(block.trigger_sample, 5);
                assert_eq!(block.preferred_transfer_size, 32);
                assert_eq!(block.reduction_factor, 4);
                assert_eq!(block.number_of_reductions, 3);
                assert!(!block.external_timebase);
                assert!((block.trigger_time_seconds - 1.5e-6).abs() < 1e-15);

                let mut raw = vec![0i32; 100];
                r.get_raw_data_l(g, i, b, 0, &mut raw)?;
                let want: Vec<i32> = expected.iter().map(|&w| w as i32).collect();
                assert_eq!(raw, want);

                let mut phys = vec![0f64; 10];
                r.get_data_d(g, i, b, 40, &mut phys)?;
                for (k, v) in phys.iter().enumerate() {
                    assert_eq!(*v, scaling.physical(expected[40 + k] as i32));
                }
            }
        }
    }
    Ok(())
}

#[test]
fn scaled_reads_follow_the_pipeline() -> Result<(), BdfError> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("scale.bdf");
    let mut c = Container::with_output(&path, options())?;
    let g = c.init_file_writer(&GroupSettings::new(1, OperationMode::Continuous, 1000.0))?;
    let mut header = InputHeader::new(2, 7, 20.0);
    header.analog_mask = 0xFFFC;
    header.marker_mask = 0x0003;
    header.offset = 0.5;
    header.volt_to_physical_factor = 100.0;
    header.volt_to_physical_constant = -3.0;
    c.write_input_header(&header, g)?;
    let words: [i16; 6] = [0x0101, -0x0102, 0x7FFF, -0x8000, 0x0003, 0];
    let s = c.init_input_streamer(2, 7, 0, g)?;
    c.write_data(s, &to_bytes(&words), g)?;
    c.write_eor_info(0, 0, 12, 7, 2, g)?;
    c.close_file(g)?;

    let mut r = Container::new();
    r.load_file(&path)?;
    let info = r.input_info(0, 0)?;
    assert_eq!(info.resolution_in_bits, 14);
    assert_eq!(info.number_of_marker_bits, 2);
    assert_eq!(info.bin_to_volt_factor, 20.0 / 65536.0);
    assert_eq!(info.bin_to_volt_constant, 0.5);
    assert_eq!(info.bin_to_physical_factor, 20.0 / 65536.0 * 100.0);
    assert_eq!(info.bin_to_physical_constant, 0.5 * 100.0 - 3.0);

    let mut markers = [0u32; 6];
    r.get_marker_data(0, 0, 0, 0, &mut markers)?;
    assert_eq!(markers, [1, 2, 3, 0, 3, 0]);

    let mut raw_s = [0i16; 6];
    r.get_raw_data_s(0, 0, 0, 0, &mut raw_s)?;
    assert_eq!(raw_s, words);

    let scaling = info.scaling();
    let mut phys = [0f64; 6];
    r.get_data_d(0, 0, 0, 0, &mut phys)?;
    let mut single = [0f32; 6];
    r.get_data_f(0, 0, 0, 0, &mut single)?;
    for (k, &w) in words.iter().enumerate() {
        let analog = (w as i32) & !3;
        let volts = scaling.volts(analog);
        let via_volts = scaling.physical_from_volts(volts);
        assert!((phys[k] - via_volts).abs() < 1e-9);
        assert_eq!(single[k], phys[k] as f32);
    }
    Ok(())
}

#[test]
fn envelope_matches_brute_force() -> Result<(), BdfError> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("env.bdf");
    let mut c = Container::with_output(&path, options())?;
    let g = c.init_file_writer(&GroupSettings::new(0, OperationMode::Continuous, 1000.0))?;
    let mut header = InputHeader::new(0, 0, 2.0);
    header.volt_to_physical_factor = -2.0;
    c.write_input_header(&header, g)?;
    let words: Vec<i16> = (0..500).map(|k| ((k * 7919) % 611) as i16 - 305).collect();
    stream_block(&mut c, g, 0, 0, &to_bytes(&words), 0)?;
    c.close_file(GroupHandle::DEFAULT)?;

    let mut r = Container::new();
    r.load_file(&path)?;
    let (address, size, count) = (13u64, 452u64, 10usize);
    let mut env = vec![0i32; count];
    r.get_env_raw_data_l(0, 0, 0, address, size, &mut env)?;
    let mut env_s = vec![0i16; count];
    r.get_env_raw_data_s(0, 0, 0, address, size, &mut env_s)?;
    let mut env_d = vec![0f64; count];
    r.get_env_data_d(0, 0, 0, address, size, &mut env_d)?;
    let mut env_f = vec![0f32; count];
    r.get_env_data_f(0, 0, 0, address, size, &mut env_f)?;

    let scaling = r.input_info(0, 0)?.scaling();
    for (k, (s, e)) in segments(address, size, count)?.into_iter().enumerate() {
        let slice = &words[s as usize..e as usize];
        let min = *slice.iter().min().unwrap_or(&0) as i32;
        let max = *slice.iter().max().unwrap_or(&0) as i32;
        assert_eq!((env[2 * k], env[2 * k + 1]), (min, max));
        assert_eq!((env_s[2 * k] as i32, env_s[2 * k + 1] as i32), (min, max));
        // negative factor flips the pair; output keeps min <= max
        assert!(env_d[2 * k] <= env_d[2 * k + 1]);
        assert_eq!(env_d[2 * k], scaling.physical(max));
        assert_eq!(env_d[2 * k + 1], scaling.physical(min));
        assert_eq!(env_f[2 * k], env_d[2 * k] as f32);
    }

    let mut odd = vec![0i32; 3];
    let err = r.get_env_raw_data_l(0, 0, 0, 0, 10, &mut odd).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Argument);
    let mut too_many = vec![0i32; 22];
    let err = r.get_env_raw_data_l(0, 0, 0, 0, 10, &mut too_many).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Argument);
    let mut past_end = vec![0i32; 2];
    let err = r.get_env_raw_data_l(0, 0, 0, 400, 101, &mut past_end).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Argument);
    Ok(())
}

#[test]
fn out_of_sequence_block_is_rejected() -> Result<(), BdfError> {
    let dir = tempfile::tempdir()?;
    let mut c = Container::with_output(dir.path().join("seq.bdf"), options())?;
    let g = c.init_file_writer(&GroupSettings::new(0, OperationMode::MultiEventRecorder, 1000.0))?;
    c.write_input_header(&InputHeader::new(0, 0, 1.0), g)?;

    let err = c.init_input_streamer(0, 0, 1, g).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Argument);

    stream_block(&mut c, g, 0, 0, &to_bytes(&[1, 2, 3, 4]), 0)?;
    let err = c.init_input_streamer(0, 0, 2, g).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Argument);
    let s = c.init_input_streamer(0, 0, 1, g)?;
    let err = c.init_input_streamer(0, 0, 1, g).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Argument);
    c.write_data(s, &to_bytes(&[5, 6]), g)?;
    c.write_eor_info(1, 0, 4, 0, 0, g)?;

    c.init_file_reader()?;
    assert_eq!(c.number_of_blocks(0, 0)?, 2);
    // multi event recorder marks the last sample as stop trigger
    assert_eq!(c.block_info(0, 0, 0)?.stop_trigger_sample, 3);
    assert_eq!(c.block_info(0, 0, 1)?.stop_trigger_sample, 1);
    Ok(())
}

#[test]
fn writes_after_end_of_record_fail() -> Result<(), BdfError> {
    let dir = tempfile::tempdir()?;
    let mut c = Container::with_output(dir.path().join("eor.bdf"), options())?;
    let g = c.init_file_writer(&GroupSettings::new(0, OperationMode::Continuous, 1000.0))?;
    c.write_input_header(&InputHeader::new(0, 0, 1.0), g)?;
    let s = c.init_input_streamer(0, 0, 0, g)?;
    c.write_data(s, &[1, 0, 2, 0, 3], g)?;

    // more than written, then not a whole number of samples
    assert_eq!(c.write_eor_info(0, 0, 6, 0, 0, g).unwrap_err().code(), ErrorCode::Argument);
    assert_eq!(c.write_eor_info(0, 0, 3, 0, 0, g).unwrap_err().code(), ErrorCode::Argument);
    c.write_eor_info(0, 0, 4, 0, 0, g)?;

    let err = c.write_data(s, &[0, 0], g).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidHandle);
    let err = c.write_eor_info(0, 0, 0, 0, 0, g).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidHandle);

    c.init_file_reader()?;
    assert_eq!(c.block_info(0, 0, 0)?.block_length, 2);
    let mut raw = [0i32; 2];
    c.get_raw_data_l(0, 0, 0, 0, &mut raw)?;
    assert_eq!(raw, [1, 2]);
    Ok(())
}

#[test]
fn truncated_block_envelope_covers_kept_samples() -> Result<(), BdfError> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("trunc.bdf");
    let mut c = Container::with_output(&path, options())?;
    let g = c.init_file_writer(&GroupSettings::new(0, OperationMode::Continuous, 1000.0))?;
    c.write_input_header(&InputHeader::new(0, 0, 1.0), g)?;
    let mut words: Vec<i16> = (0..64).collect();
    words.extend([i16::MAX; 16]);
    let s = c.init_input_streamer(0, 0, 0, g)?;
    c.write_data(s, &to_bytes(&words), g)?;
    c.write_eor_info(0, 0, 128, 0, 0, g)?;
    c.close_file(g)?;

    let mut r = Container::new();
    r.load_file(&path)?;
    let info = r.block_info(0, 0, 0)?;
    assert_eq!(info.block_length, 64);
    assert_eq!(info.number_of_reductions, 3);
    let mut env = [0i32; 2];
    r.get_env_raw_data_l(0, 0, 0, 0, 64, &mut env)?;
    assert_eq!(env, [0, 63]);
    Ok(())
}

#[test]
fn mask_overlap_registers_nothing() -> Result<(), BdfError> {
    let dir = tempfile::tempdir()?;
    let mut c = Container::with_output(dir.path().join("mask.bdf"), options())?;
    let g = c.init_file_writer(&GroupSettings::new(0, OperationMode::Continuous, 1000.0))?;
    let mut header = InputHeader::new(0, 3, 1.0);
    header.analog_mask = 0xFF00;
    header.marker_mask = 0x0100;
    let err = c.write_input_header(&header, g).unwrap_err();
    assert!(matches!(err, BdfError::MaskOverlap { .. }));
    assert_eq!(err.code(), ErrorCode::Argument);
    assert_eq!(c.init_input_streamer(0, 3, 0, g).unwrap_err().code(), ErrorCode::InvalidHandle);

    c.write_input_header(&InputHeader::new(0, 4, 1.0), g)?;
    c.init_file_reader()?;
    assert_eq!(c.number_of_inputs(0)?, 1);
    assert_eq!(c.input_info(0, 0)?.input_number, 4);
    Ok(())
}

#[test]
fn input_header_frozen_once_streamed() -> Result<(), BdfError> {
    let dir = tempfile::tempdir()?;
    let mut c = Container::with_output(dir.path().join("hdr.bdf"), options())?;
    let g = c.init_file_writer(&GroupSettings::new(0, OperationMode::Continuous, 1000.0))?;
    c.write_input_header(&InputHeader::new(0, 0, 1.0), g)?;
    // replacing before any stream is fine
    assert_eq!(c.write_input_header(&InputHeader::new(0, 0, 5.0), g)?, 0);
    c.init_input_streamer(0, 0, 0, g)?;
    let err = c.write_input_header(&InputHeader::new(0, 0, 2.0), g).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Argument);
    c.init_file_reader()?;
    assert_eq!(c.input_info(0, 0)?.bin_to_volt_factor, 5.0 / 65536.0);
    Ok(())
}

#[test]
fn attributes_seal_after_write() -> Result<(), BdfError> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("attr.bdf");
    let mut c = Container::with_output(&path, options())?;
    let g = c.init_file_writer(&GroupSettings::new(0, OperationMode::Continuous, 1000.0))?;
    c.write_input_header(&InputHeader::new(0, 0, 1.0), g)?;
    c.write_input_header(&InputHeader::new(0, 1, 1.0), g)?;
    c.set_attribute(0, keys::CHANNEL_NAME, "Voltage L1", g)?;
    c.set_attribute(0, keys::PHYSICAL_UNIT, "V", g)?;
    c.set_product_unit(0, "V", "A", g)?;
    c.set_attribute(1, keys::CHANNEL_NAME, "Current", g)?;
    assert_eq!(c.set_attribute(5, "x", "y", g).unwrap_err().code(), ErrorCode::Argument);

    c.write_attributes(g)?;
    let err = c.set_attribute(0, "late", "value", g).unwrap_err();
    assert!(matches!(err, BdfError::AttributesSealed(_)));
    assert_eq!(err.code(), ErrorCode::Internal);
    c.close_file(GroupHandle::DEFAULT)?;

    let mut r = Container::new();
    r.load_file(&path)?;
    assert_eq!(r.get_attribute(0, 0, keys::CHANNEL_NAME)?, "Voltage L1");
    assert_eq!(r.get_attribute(0, 0, keys::PHYSICAL_UNIT)?, "V*A");
    assert_eq!(r.get_attribute(0, 0, keys::PHYSICAL_UNIT_EXT)?, "V");
    assert_eq!(r.get_attribute(0, 1, keys::CHANNEL_NAME)?, "Current");
    assert!(r.get_attribute(0, 1, "late").is_err());
    Ok(())
}

#[test]
fn double_close_is_rejected() -> Result<(), BdfError> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("close.bdf");
    let mut c = Container::with_output(&path, options())?;
    let g = c.init_file_writer(&GroupSettings::new(0, OperationMode::Continuous, 1000.0))?;
    c.write_input_header(&InputHeader::new(0, 0, 1.0), g)?;
    stream_block(&mut c, g, 0, 0, &to_bytes(&[9; 40]), 0)?;
    c.close_file(GroupHandle::DEFAULT)?;
    let modified = std::fs::metadata(&path)?.modified()?;

    let err = c.close_file(GroupHandle::DEFAULT).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidHandle);
    assert_eq!(c.close_file(g).unwrap_err().code(), ErrorCode::InvalidHandle);
    assert_eq!(std::fs::metadata(&path)?.modified()?, modified);
    assert!(!path.with_extension("tmp").exists());
    Ok(())
}

#[test]
fn group_handles_close_independently() -> Result<(), BdfError> {
    init_logging();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("dual.bdf");
    let mut c = Container::with_output(&path, options())?;
    let mut fast = GroupSettings::new(0, OperationMode::SingleEventRecorderDual, 1e6);
    fast.timebase_divisor = 4;
    let g1 = c.init_file_writer(&fast)?;
    let g2 = c.init_file_writer(&GroupSettings::new(1, OperationMode::Continuous, 1e3))?;
    assert_ne!(g1, g2);
    assert!(c.init_file_writer(&GroupSettings::new(1, OperationMode::Continuous, 1e3)).is_err());

    c.write_input_header(&InputHeader::new(0, 0, 1.0), g1)?;
    c.write_input_header(&InputHeader::new(0, 0, 1.0), g2)?;
    // DEFAULT addresses the oldest open group
    stream_block(&mut c, GroupHandle::DEFAULT, 0, 0, &to_bytes(&[1, 2]), 0)?;
    c.close_file(g1)?;
    assert!(!path.exists());

    let err = c.write_input_header(&InputHeader::new(0, 1, 1.0), g1).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidHandle);
    assert_eq!(c.close_file(g1).unwrap_err().code(), ErrorCode::InvalidHandle);

    // g2 is now the oldest open group
    stream_block(&mut c, GroupHandle::DEFAULT, 0, 0, &to_bytes(&[3, 4, 5]), 0)?;
    c.close_file(g2)?;
    assert!(path.exists());

    let mut r = Container::new();
    r.load_file(&path)?;
    assert_eq!(r.operation_mode(0)?, OperationMode::SingleEventRecorderDual);
    assert_eq!(r.block_info(0, 0, 0)?.timebase_divisor, 4);
    assert_eq!(r.block_info(0, 0, 0)?.block_length, 2);
    assert_eq!(r.block_info(1, 0, 0)?.block_length, 3);
    Ok(())
}

#[test]
fn open_streams_are_finalized_on_close() -> Result<(), BdfError> {
    init_logging();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("auto.bdf");
    let mut c = Container::with_output(&path, options())?;
    let g = c.init_file_writer(&GroupSettings::new(0, OperationMode::Continuous, 1000.0))?;
    c.write_input_header(&InputHeader::new(0, 0, 1.0), g)?;
    let s = c.init_input_streamer(0, 0, 0, g)?;
    let mut bytes = to_bytes(&[7; 10]);
    bytes.push(0xAA);
    c.write_data(s, &bytes, g)?;
    c.close_file(GroupHandle::DEFAULT)?;

    let mut r = Container::new();
    r.load_file(&path)?;
    assert_eq!(r.block_info(0, 0, 0)?.block_length, 10);
    Ok(())
}

#[test]
fn unclosed_container_stays_temporary() -> Result<(), BdfError> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("crash.bdf");
    {
        let mut c = Container::with_output(&path, options())?;
        let g = c.init_file_writer(&GroupSettings::new(0, OperationMode::Continuous, 1000.0))?;
        c.write_input_header(&InputHeader::new(0, 0, 1.0), g)?;
        stream_block(&mut c, g, 0, 0, &to_bytes(&[1; 20]), 0)?;
    }
    let temp = path.with_extension("tmp");
    assert!(temp.exists());
    assert!(!path.exists());

    let mut r = Container::new();
    let err = r.load_file(&temp).unwrap_err();
    assert!(matches!(err, BdfError::IncompleteContainer(_)));
    assert_eq!(err.code(), ErrorCode::Argument);
    Ok(())
}

#[test]
fn live_reader_sees_finalized_blocks_only() -> Result<(), BdfError> {
    let dir = tempfile::tempdir()?;
    let mut c = Container::with_output(dir.path().join("live.bdf"), options())?;
    let g = c.init_file_writer(&GroupSettings::new(0, OperationMode::Continuous, 1000.0))?;
    assert!(c.init_file_reader().is_err());
    c.write_input_header(&InputHeader::new(0, 0, 1.0), g)?;
    c.init_file_reader()?;
    assert_eq!(c.number_of_blocks(0, 0)?, 0);

    let words: Vec<i16> = (0..50).collect();
    stream_block(&mut c, g, 0, 0, &to_bytes(&words), 0)?;
    let s = c.init_input_streamer(0, 0, 1, g)?;
    c.write_data(s, &to_bytes(&words), g)?;
    assert_eq!(c.number_of_blocks(0, 0)?, 1);

    let mut raw = [0i16; 5];
    c.get_raw_data_s(0, 0, 0, 45, &mut raw)?;
    assert_eq!(raw, [45, 46, 47, 48, 49]);
    assert_eq!(c.get_raw_data_s(0, 0, 1, 0, &mut raw).unwrap_err().code(), ErrorCode::InvalidHandle);
    Ok(())
}

#[test]
fn wide_inputs_reject_short_raw_reads() -> Result<(), BdfError> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("wide.bdf");
    let mut c = Container::with_output(&path, options())?;
    let g = c.init_file_writer(&GroupSettings::new(0, OperationMode::Continuous, 1000.0))?;
    let mut header = InputHeader::new(0, 0, 1.0);
    header.analog_mask = 0x00FF_FFFF;
    c.write_input_header(&header, g)?;
    let words: [i32; 3] = [-1, 0x7F_FFFF, 12];
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    stream_block(&mut c, g, 0, 0, &bytes, 0)?;
    c.close_file(g)?;

    let mut r = Container::new();
    r.load_file(&path)?;
    assert_eq!(r.input_info(0, 0)?.bytes_per_sample, 4);
    let mut short = [0i16; 1];
    assert_eq!(r.get_raw_data_s(0, 0, 0, 0, &mut short).unwrap_err().code(), ErrorCode::Argument);
    let mut long = [0i32; 3];
    r.get_raw_data_l(0, 0, 0, 0, &mut long)?;
    assert_eq!(long, words);
    let mut past = [0i32; 2];
    assert_eq!(r.get_raw_data_l(0, 0, 0, 2, &mut past).unwrap_err().code(), ErrorCode::Argument);
    assert_eq!(r.get_raw_data_l(0, 1, 0, 0, &mut past).unwrap_err().code(), ErrorCode::InvalidHandle);
    Ok(())
}

#[test]
fn options_load_from_json_file() -> Result<(), BdfError> {
    let dir = tempfile::tempdir()?;
    let cfg = dir.path().join("writer.json");
    std::fs::write(&cfg, r#"{ "transfer_size": 4096, "sync_on_close": false }"#)?;
    let options = WriterOptions::from_json_file(&cfg)?;
    assert_eq!(options.transfer_size, 4096);
    assert_eq!(options.reduction_factor, 64);
    assert!(!options.sync_on_close);

    let bad = WriterOptions { reduction_factor: 1, ..WriterOptions::default() };
    let err = Container::with_output(Path::new("unused.bdf"), bad).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Argument);
    Ok(())
}

#[test]
fn failed_promotion_keeps_temporary_file() -> Result<(), BdfError> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("blocked.bdf");
    // a non-empty directory at the final name makes the rename fail
    std::fs::create_dir(&path)?;
    std::fs::write(path.join("occupant"), b"x")?;

    let mut c = Container::with_output(&path, options())?;
    let g = c.init_file_writer(&GroupSettings::new(0, OperationMode::Continuous, 1000.0))?;
    c.write_input_header(&InputHeader::new(0, 0, 1.0), g)?;
    stream_block(&mut c, g, 0, 0, &to_bytes(&block_words(0, 0, 0, 40)), 0)?;
    let temp = c.temp_path().map(Path::to_path_buf);

    let err = c.close_file(GroupHandle::DEFAULT).unwrap_err();
    assert!(matches!(err, BdfError::PromotionFailed { .. }), "{}", err);
    assert_eq!(err.code(), ErrorCode::Resource);
    assert_eq!(temp.as_deref(), Some(path.with_extension("tmp").as_path()));
    assert!(path.with_extension("tmp").is_file());
    assert!(path.is_dir());

    let again = c.close_file(GroupHandle::DEFAULT).unwrap_err();
    assert_eq!(again.code(), ErrorCode::InvalidHandle);
    assert!(path.with_extension("tmp").is_file());
    Ok(())
}

fn assert_sync<T: Sync>() {}

#[test]
fn finalized_blocks_read_concurrently() -> Result<(), BdfError> {
    assert_sync::<Container>();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("shared.bdf");
    let mut c = Container::with_output(&path, options())?;
    let g = c.init_file_writer(&GroupSettings::new(0, OperationMode::Continuous, 1000.0))?;
    for i in 0..2u32 {
        c.write_input_header(&InputHeader::new(0, i, 5.0), g)?;
    }
    for b in 0..2u32 {
        for i in 0..2u32 {
            stream_block(&mut c, g, i, b, &to_bytes(&block_words(0, i, b, 300)), 0)?;
        }
    }
    c.close_file(GroupHandle::DEFAULT)?;

    let mut r = Container::new();
    r.load_file(&path)?;
    let read_all = |r: &Container| -> Result<Vec<(Vec<f64>, Vec<f64>)>, BdfError> {
        let mut out = Vec::new();
        for i in 0..2 {
            for b in 0..2 {
                let mut data = vec![0f64; 300];
                r.get_data_d(0, i, b, 0, &mut data)?;
                let mut env = vec![0f64; 20];
                r.get_env_data_d(0, i, b, 7, 290, &mut env)?;
                out.push((data, env));
            }
        }
        Ok(out)
    };

    let expected = read_all(&r)?;
    let shared = &r;
    std::thread::scope(|s| -> Result<(), BdfError> {
        let workers: Vec<_> = (0..4).map(|_| s.spawn(|| read_all(shared))).collect();
        for worker in workers {
            let got = worker.join().expect("reader thread panicked")?;
            assert_eq!(got, expected);
        }
        Ok(())
    })
}
