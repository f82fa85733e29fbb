use divan::AllocProfiler;

#[global_allocator]
static ALLOC: AllocProfiler = AllocProfiler::system();

fn main() {
    divan::main();
}

fn get_input() -> Vec<u8> {
    (0..0x10_0000u32).map(|i| (i % 251) as u8).collect()
}

pub mod compress {
    use divan::Bencher;

    #[divan::bench]
    fn literals(bencher: Bencher) {
        bencher
            .with_inputs(super::get_input)
            .bench_refs(|data| divan::black_box(pso2_prs::compress(data).unwrap()));
    }
}

pub mod decompress {
    use divan::Bencher;
    use std::io::{Cursor, Read, Seek, SeekFrom};

    fn get_stream() -> (Vec<u8>, usize) {
        let input = super::get_input();
        (pso2_prs::compress(&input).unwrap(), input.len())
    }

    #[divan::bench]
    fn whole(bencher: Bencher) {
        bencher
            .with_inputs(get_stream)
            .bench_refs(|(stream, size)| divan::black_box(pso2_prs::decompress(stream, *size).unwrap()));
    }

    #[divan::bench(sample_count = 10)]
    fn seek_backwards(bencher: Bencher) {
        let (stream, size) = get_stream();
        bencher.bench_local(move || {
            let mut reader = pso2_prs::PrsReader::new(Cursor::new(&stream), size as u64);
            let mut buffer = [0u8; 16];

            reader.seek(SeekFrom::End(-16)).unwrap();
            reader.read_exact(&mut buffer).unwrap();
            reader.seek(SeekFrom::Start(0)).unwrap();
            reader.read_exact(&mut buffer).unwrap();
        });
    }
}
