fn main() {
    if let Err(e) = medicore_lib::run() {
        eprintln!("medicore: {e}");
        std::process::exit(1);
    }
}
