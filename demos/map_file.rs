// Maps a file, stamps its first bytes, and prints what the mapping reports.
//
// Usage: cargo run --example map_file -- <path> [offset] [length]



use std::fs::OpenOptions;

use pmap::{Config, Mapper, Source};



fn main() {
    let mut args = std::env::args().skip(1);
    let path = args.next().expect("usage: map_file <path> [offset] [length]");
    let offset: u64 = args.next().map_or(0, |s| s.parse().unwrap());
    let length: usize = args.next().map_or(0, |s| s.parse().unwrap());

    // The file has to outlive the mapping; the config only borrows its descriptor.
    let file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
    let config = Config::new()
        .source(Source::from_file(&file))
        .offset(offset)
        .length(length);

    println!("alignment:   {:#x}", config.alignment().unwrap());

    let mapper = Mapper::platform();
    let mut mapping = match mapper.map(&config) {
        Ok(mapping) => Some(mapping),
        Err(e) => {
            eprintln!("failed to map {path}: {e}");
            std::process::exit(1);
        }
    };

    if let Some(mapping) = &mapping {
        println!("address:     {:p}", mapping.address());
        println!("size:        {:#x}", mapping.size());
        println!("reserved:    {:#x}", mapping.reserved_length());
        println!("granularity: {:?}", mapping.store_granularity());

        let stamp = b"pmap";
        if mapping.size() >= stamp.len() {
            unsafe { mapping.as_ptr().copy_from_nonoverlapping(stamp.as_ptr(), stamp.len()) };
        }
    }
    println!("live mappings: {}", mapper.registry().len());

    mapper.unmap(&mut mapping).unwrap();
    println!("live mappings: {}", mapper.registry().len());
}
