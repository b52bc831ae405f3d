fn main() {
    if let Err(error) = rtsp_window_recorder_lib::run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}
