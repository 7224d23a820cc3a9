fn main() {
    if let Err(err) = map_renderer::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
