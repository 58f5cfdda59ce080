fn main() -> std::process::ExitCode {
    forecast_console_lib::run()
}
