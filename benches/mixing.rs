use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rtp_monitor::{codec, constants::*, mix, ring::RingBuffer, Packet};

fn pcm_datagram(frames: usize) -> Bytes {
    let mut out = vec![0u8; RTP_MIN_SIZE + 2 * frames];
    out[0] = RTP_VERSION << 6;
    out[1] = PCM_MONO_PT;
    BigEndian::write_u16(&mut out[2..4], 1);
    BigEndian::write_u32(&mut out[4..8], 960);
    BigEndian::write_u32(&mut out[8..12], 0xDEAD_BEEF);

    for (i, s) in out[RTP_MIN_SIZE..].chunks_exact_mut(2).enumerate() {
        BigEndian::write_i16(s, ((i as f32 * 0.1).sin() * 8_000.0) as i16);
    }

    out.into()
}

pub fn parse_and_convert(c: &mut Criterion) {
    let mut group = c.benchmark_group("Receive");

    for frames in [160, 480, 960] {
        let datagram = pcm_datagram(frames);
        let mut stereo = vec![0.0f32; 2 * MAX_FRAME_SIZE];

        group.bench_with_input(BenchmarkId::new("Parse + PCM", frames), &datagram, |b, dg| {
            b.iter(|| {
                let pkt = Packet::parse(black_box(dg.clone())).unwrap();
                black_box(codec::pcm_to_stereo(&pkt.payload, 1, &mut stereo[..]).unwrap())
            })
        });
    }

    group.finish();
}

pub fn mix_and_drain(c: &mut Criterion) {
    let frames = 960;
    let bounce: Vec<f32> = (0..2 * frames).map(|i| (i as f32 * 0.01).sin()).collect();

    let mut group = c.benchmark_group("Ring");

    for sessions in [1, 8, 64] {
        group.bench_with_input(
            BenchmarkId::new("Mix sessions", sessions),
            &sessions,
            |b, n| {
                b.iter_batched_ref(
                    || RingBuffer::new(1 << 16).unwrap(),
                    |ring| {
                        for s in 0..*n {
                            let pan = mix::auto_position(s as u32);
                            let [lg, rg] = mix::pan_gains(1.0, pan);
                            let [ld, rd] = mix::pan_delays(pan, 48_000);
                            let start = ring.read_cursor() + 4_800;

                            for (i, frame) in bounce.chunks_exact(2).enumerate() {
                                let pos = start + i as i64;
                                ring.add(pos + ld as i64, 0, frame[0] * lg);
                                ring.add(pos + rd as i64, 1, frame[1] * rg);
                            }
                        }
                    },
                    BatchSize::LargeInput,
                )
            },
        );
    }

    let mut out = vec![0.0f32; 2 * 1024];
    group.bench_function("Drain across wrap", |b| {
        b.iter_batched_ref(
            || {
                let mut ring = RingBuffer::new(4096).unwrap();
                let mut skip = vec![0.0f32; 2 * 1792];
                ring.drain(&mut skip).unwrap();
                ring.drain(&mut skip).unwrap();
                ring
            },
            |ring| {
                ring.drain(black_box(&mut out[..])).unwrap();
                ring.drain(black_box(&mut out[..])).unwrap();
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

criterion_group!(benches, parse_and_convert, mix_and_drain);
criterion_main!(benches);
