use std::process::ExitCode;

fn main() -> ExitCode {
    renovation_ocr_lib::run_admin()
}
