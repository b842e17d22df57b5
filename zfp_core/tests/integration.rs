/// Integration tests for the block codec and the whole-field stream format.
///
/// These exercise the public API only: fields are compressed with
/// `field::compress`, decoded back, and compared against the input under the
/// guarantees each mode makes (exact block size for fixed rate, absolute
/// error bound for fixed accuracy).
use zfp_core::field::{compress, decompress, decompress_block, gather_block};
use zfp_core::{BitStream, Codec, Header, Mode, Scalar, ScalarType, Shape, StreamHeader, ZfpError, HEADER_BYTES};

// ── helpers ───────────────────────────────────────────────────────────────

/// Smooth 2D test field.
fn wave_2d(nx: usize, ny: usize) -> Vec<f64> {
    let mut data = Vec::with_capacity(nx * ny);
    for y in 0..ny {
        for x in 0..nx {
            let (fx, fy) = (x as f64, y as f64);
            data.push((0.3 * fx).sin() * (0.2 * fy).cos() + 0.01 * fx * fy);
        }
    }
    data
}

/// Gaussian bump centred in an `n^3` cube.
fn bump_3d(n: usize) -> Vec<f64> {
    let c = 4.0;
    let mut data = Vec::with_capacity(n * n * n);
    for z in 0..n {
        for y in 0..n {
            for x in 0..n {
                let r2 = (x as f64 - c).powi(2) + (y as f64 - c).powi(2) + (z as f64 - c).powi(2);
                data.push((-r2 / 20.0).exp());
            }
        }
    }
    data
}

fn max_error<T: Copy + Into<f64>>(a: &[T], b: &[T]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| (x.into() - y.into()).abs())
        .fold(0.0, f64::max)
}

/// Deterministic 64-bit LCG step.
fn next_random(state: &mut u64) -> u64 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    *state
}

fn pseudo_random_bytes(len: usize, state: &mut u64) -> Vec<u8> {
    (0..len).map(|_| (next_random(state) >> 33) as u8).collect()
}

/// Uniform in `[-1, 1)`.
fn pseudo_random_signed(state: &mut u64) -> f64 {
    (next_random(state) >> 11) as f64 / (1u64 << 52) as f64 - 1.0
}

/// Decodes `count` random bit patterns of exactly one fixed-rate block each.
fn decode_arbitrary_blocks<T: Scalar>(dims: usize, block_bits: u32, count: usize) -> anyhow::Result<()> {
    let codec = Codec::new(Mode::FixedRate { block_bits }, T::TYPE, dims)?;
    let mut out = vec![T::default(); codec.block_len()];
    let mut state = 0x9e37_79b9_7f4a_7c15 ^ (dims as u64) << 32 ^ block_bits as u64;
    for _ in 0..count {
        let bytes = pseudo_random_bytes(block_bits as usize / 8, &mut state);
        let mut stream = BitStream::new(&bytes[..]);
        let bits = codec.decode_block(&mut stream, &mut out)?;
        assert_eq!(bits, block_bits as usize, "{} {dims}D, {block_bits} bits", T::TYPE);
        assert_eq!(stream.position(), block_bits as usize);
    }
    Ok(())
}

// ── tests ──────────────────────────────────────────────────────────────────

#[test]
fn test_fixed_accuracy_respects_tolerance() -> anyhow::Result<()> {
    let shape = Shape::new(&[16, 16])?;
    let data = wave_2d(16, 16);
    let mode = Mode::fixed_accuracy(1e-6);
    let tolerance = mode.tolerance().unwrap();
    assert!(tolerance <= 1e-6);

    let bytes = compress(&data, &shape, mode)?;
    let (header, decoded) = decompress::<f64>(&bytes)?;
    assert_eq!(header.shape, shape);
    assert_eq!(header.mode, mode);
    let err = max_error(&data, &decoded);
    assert!(err <= tolerance, "max error {err} exceeds {tolerance}");
    Ok(())
}

#[test]
fn test_partial_blocks_roundtrip() -> anyhow::Result<()> {
    // neither extent is a multiple of the block side
    let shape = Shape::new(&[7, 5])?;
    let data = wave_2d(7, 5);
    let mode = Mode::fixed_accuracy(1e-8);

    let bytes = compress(&data, &shape, mode)?;
    let (_, decoded) = decompress::<f64>(&bytes)?;
    assert_eq!(decoded.len(), 35);
    assert!(max_error(&data, &decoded) <= mode.tolerance().unwrap());
    Ok(())
}

#[test]
fn test_one_dimensional_field() -> anyhow::Result<()> {
    let shape = Shape::new(&[50])?;
    let data: Vec<f64> = (0..50).map(|i| 100.0 * (i as f64 * 0.1).sin()).collect();
    let mode = Mode::fixed_accuracy(1e-3);

    let (_, decoded) = decompress::<f64>(&compress(&data, &shape, mode)?)?;
    assert!(max_error(&data, &decoded) <= mode.tolerance().unwrap());
    Ok(())
}

#[test]
fn test_fixed_rate_size_is_exact() -> anyhow::Result<()> {
    let shape = Shape::new(&[8, 8, 8])?;
    let data = bump_3d(8);
    let mode = Mode::fixed_rate(16.0, ScalarType::Double, 3);
    assert_eq!(mode.block_bits(), Some(1024));

    let bytes = compress(&data, &shape, mode)?;
    // header + 8 blocks of 1024 bits, no trailing padding needed
    assert_eq!(bytes.len(), HEADER_BYTES + 8 * 1024 / 8);

    let (_, decoded) = decompress::<f64>(&bytes)?;
    assert!(max_error(&data, &decoded) < 1e-5);
    Ok(())
}

#[test]
fn test_fixed_rate_single_precision() -> anyhow::Result<()> {
    let shape = Shape::new(&[8, 8, 8])?;
    let data: Vec<f32> = bump_3d(8).into_iter().map(|v| v as f32).collect();
    let mode = Mode::fixed_rate(8.0, ScalarType::Float, 3);

    let bytes = compress(&data, &shape, mode)?;
    assert_eq!(bytes.len(), HEADER_BYTES + 8 * 512 / 8);
    let (_, decoded) = decompress::<f32>(&bytes)?;
    assert!(max_error(&data, &decoded) < 1e-3);
    Ok(())
}

#[test]
fn test_every_fixed_rate_block_has_the_same_width() -> anyhow::Result<()> {
    let codec = Codec::new(Mode::FixedRate { block_bits: 256 }, ScalarType::Double, 2)?;
    let blocks: [[f64; 16]; 3] = [
        [0.0; 16],
        [1.0; 16],
        std::array::from_fn(|i| (i as f64).powi(3) - 1e4),
    ];
    let mut stream = BitStream::default();
    for block in &blocks {
        assert_eq!(codec.encode_block(&mut stream, block)?, 256);
    }
    assert_eq!(stream.position(), 3 * 256);
    Ok(())
}

#[test]
fn test_fixed_rate_decode_stays_within_block() -> anyhow::Result<()> {
    let codec = Codec::new(Mode::FixedRate { block_bits: 128 }, ScalarType::Float, 1)?;
    let mut stream = BitStream::default();
    codec.encode_block(&mut stream, &[1.5f32, -2.25, 3.0, 0.125])?;
    let bytes = stream.into_inner();
    assert_eq!(bytes.len(), 16);

    // a buffer of exactly one block must be enough to decode it
    let mut reader = BitStream::new(&bytes[..]);
    let mut out = [0.0f32; 4];
    assert_eq!(codec.decode_block(&mut reader, &mut out)?, 128);
    assert_eq!(reader.position(), 128);
    assert_eq!(out, [1.5, -2.25, 3.0, 0.125]);
    Ok(())
}

#[test]
fn test_zero_field_is_exact() -> anyhow::Result<()> {
    let shape = Shape::new(&[9, 4, 6])?;
    let data = vec![0.0f64; shape.len()];
    let bytes = compress(&data, &shape, Mode::fixed_precision(20))?;
    let (_, decoded) = decompress::<f64>(&bytes)?;
    assert_eq!(decoded, data);
    Ok(())
}

#[test]
fn test_random_access_to_one_block() -> anyhow::Result<()> {
    let shape = Shape::new(&[12, 12, 12])?;
    let data = bump_3d(12);
    for mode in [Mode::fixed_rate(12.0, ScalarType::Double, 3), Mode::fixed_precision(30)] {
        let bytes = compress(&data, &shape, mode)?;
        let (_, decoded) = decompress::<f64>(&bytes)?;

        let block = decompress_block::<f64>(&bytes, 13)?;
        let mut expected = vec![0.0f64; 64];
        gather_block(&decoded, &shape, 13, &mut expected);
        assert_eq!(block, expected, "{mode:?}");
    }

    let bytes = compress(&data, &shape, Mode::fixed_precision(30))?;
    assert!(matches!(
        decompress_block::<f64>(&bytes, 27),
        Err(ZfpError::IndexOutOfBounds { .. })
    ));
    Ok(())
}

#[test]
fn test_integer_field() -> anyhow::Result<()> {
    let shape = Shape::new(&[4, 4])?;
    let data: Vec<i32> = (0..16).map(|i| (i * i * 37 - 400) << 8).collect();
    let (header, decoded) = decompress::<i32>(&compress(&data, &shape, Mode::fixed_precision(64))?)?;
    assert_eq!(header.scalar, ScalarType::Int32);
    for (a, b) in decoded.iter().zip(&data) {
        assert!((a - b).abs() <= 4, "{a} vs {b}");
    }
    Ok(())
}

#[test]
fn test_truncated_stream_is_an_error() -> anyhow::Result<()> {
    let shape = Shape::new(&[16, 16])?;
    let bytes = compress(&wave_2d(16, 16), &shape, Mode::fixed_precision(40))?;
    let truncated = &bytes[..bytes.len() / 2];
    assert!(matches!(
        decompress::<f64>(truncated),
        Err(ZfpError::Bounds { .. })
    ));
    Ok(())
}

#[test]
fn test_scalar_type_mismatch() -> anyhow::Result<()> {
    let shape = Shape::new(&[4])?;
    let bytes = compress(&[1.0f32, 2.0, 3.0, 4.0], &shape, Mode::fixed_precision(16))?;
    assert_eq!(
        decompress::<f64>(&bytes).unwrap_err(),
        ZfpError::ScalarTypeMismatch {
            expected: ScalarType::Double,
            found: ScalarType::Float,
        }
    );
    Ok(())
}

#[test]
fn test_header_roundtrip_is_idempotent() -> anyhow::Result<()> {
    let cases = [
        (ScalarType::Float, vec![1usize << 48], Mode::fixed_precision(128)),
        (ScalarType::Double, vec![300, 200], Mode::fixed_accuracy(1e-4)),
        (ScalarType::Double, vec![12, 12, 12], Mode::fixed_rate(32.0, ScalarType::Double, 3)),
    ];
    for (scalar, extents, mode) in cases {
        let header = Header::new(scalar, Shape::new(&extents)?, mode)?;
        let bytes = header.to_bytes();
        let decoded = Header::from_bytes(&bytes)?;
        assert_eq!(decoded, header);
        assert_eq!(decoded.to_bytes(), bytes);
    }
    Ok(())
}

#[test]
fn test_header_rejections() -> anyhow::Result<()> {
    let cube = Shape::new(&[12, 12, 12])?;
    assert_eq!(
        Header::new(ScalarType::Int32, cube, Mode::fixed_precision(8)).unwrap_err(),
        ZfpError::UnsupportedScalarType
    );
    assert_eq!(
        Header::new(ScalarType::Double, cube, Mode::fixed_rate(33.0, ScalarType::Double, 3)).unwrap_err(),
        ZfpError::HeaderTooLong
    );
    assert_eq!(
        Header::new(ScalarType::Double, Shape::new(&[4, 4, 4, 4])?, Mode::fixed_precision(8)).unwrap_err(),
        ZfpError::HeaderTooLong
    );

    // a 4D stream header is legal, but not as an array header
    let mut stream = BitStream::default();
    StreamHeader::new(ScalarType::Float, Shape::new(&[4, 4, 4, 4])?, Mode::fixed_precision(8)).write(&mut stream)?;
    assert_eq!(
        Header::from_bytes(stream.as_bytes()).unwrap_err(),
        ZfpError::UnsupportedDimensionality
    );
    Ok(())
}

#[test]
fn test_fixed_rate_decode_of_arbitrary_bits_stays_in_block() -> anyhow::Result<()> {
    for dims in 1..=3 {
        for block_bits in [64, 128, 192, 512, 1024, 2048] {
            decode_arbitrary_blocks::<f32>(dims, block_bits, 100)?;
            decode_arbitrary_blocks::<f64>(dims, block_bits, 100)?;
        }
    }
    Ok(())
}

#[test]
fn test_fixed_accuracy_bound_on_random_blocks() -> anyhow::Result<()> {
    let mut state = 0x5eed;
    for dims in 1..=3 {
        for tolerance in [1e-1, 1e-4, 1e-8] {
            let codec = Codec::new(Mode::fixed_accuracy(tolerance), ScalarType::Double, dims)?;
            let n = codec.block_len();
            for magnitude in [1e-3, 1.0, 1e3, 1e6] {
                for _ in 0..20 {
                    let block: Vec<f64> = (0..n).map(|_| magnitude * pseudo_random_signed(&mut state)).collect();
                    let mut stream = BitStream::default();
                    let bits = codec.encode_block(&mut stream, &block)?;
                    stream.rewind();
                    let mut out = vec![0.0f64; n];
                    assert_eq!(codec.decode_block(&mut stream, &mut out)?, bits);
                    let err = max_error(&block, &out);
                    assert!(
                        err <= tolerance,
                        "{dims}D, magnitude {magnitude}, tolerance {tolerance}: error {err}"
                    );
                }
            }
        }
    }
    Ok(())
}
