/// Whether stdout is a terminal that understands ANSI color codes.
pub fn stdout_supports_ansi() -> bool {
    supports_color::on(supports_color::Stream::Stdout).is_some()
}
