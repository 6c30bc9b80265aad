use std::{env, fs, process};

use log::{error, info};
use web_patcher::decode;

fn usage() -> ! {
    eprintln!("usage: bin <source> <patch> <output> [--ignore-checksums]");
    process::exit(2);
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let ignore_checksums = match args.iter().position(|a| a == "--ignore-checksums") {
        Some(i) => {
            args.remove(i);
            true
        }
        None => false,
    };

    let [source, patch, output] = args.as_slice() else {
        usage();
    };

    let read = |path: &str| {
        fs::read(path).unwrap_or_else(|e| {
            error!("{path}: {e}");
            process::exit(1);
        })
    };
    let source_bytes = read(source);
    let patch_bytes = read(patch);

    let target = match decode(&source_bytes, &patch_bytes, !ignore_checksums) {
        Ok(target) => target,
        Err(e) => {
            error!("{patch}: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = fs::write(output, &target) {
        error!("{output}: {e}");
        process::exit(1);
    }
    info!("wrote {} byte(s) to {output}", target.len());
}
