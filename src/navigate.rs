use std::future::Future;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};

/// Leaving the progress view for another page.
pub trait Navigator {
    fn navigate(&mut self, url: &str);
}

/// Opens pages in the system browser.
pub struct BrowserNavigator;

impl Navigator for BrowserNavigator {
    fn navigate(&mut self, url: &str) {
        log::info!("opening {url}");
        if let Err(e) = opener::open(url) {
            log::warn!("failed to open browser: {e}");
            eprintln!("Open {url} to continue.");
        }
    }
}

/// Only reports where the user would go (`--no-open`).
pub struct PrintNavigator;

impl Navigator for PrintNavigator {
    fn navigate(&mut self, url: &str) {
        log::info!("next page: {url}");
        eprintln!("Next: {url}");
    }
}

impl<N: Navigator + ?Sized> Navigator for Box<N> {
    fn navigate(&mut self, url: &str) {
        (**self).navigate(url);
    }
}

/// Yes/no question put to the user before a destructive action.
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> impl Future<Output = bool>;
}

/// Always answers yes (`--yes`).
pub struct AutoConfirm;

impl Confirm for AutoConfirm {
    async fn confirm(&mut self, prompt: &str) -> bool {
        log::debug!("auto-confirmed: {prompt}");
        true
    }
}

/// Reads a `y/N` answer from a line of input, stdin by default.
///
/// `on_eof` is the answer when the input is closed, i.e. nobody is there to
/// reply.
pub struct TerminalConfirm<R = BufReader<Stdin>> {
    input: R,
    on_eof: bool,
}

impl TerminalConfirm {
    pub fn stdin(on_eof: bool) -> Self {
        TerminalConfirm::new(BufReader::new(tokio::io::stdin()), on_eof)
    }
}

impl<R: AsyncBufRead + Unpin> TerminalConfirm<R> {
    pub fn new(input: R, on_eof: bool) -> Self {
        TerminalConfirm { input, on_eof }
    }
}

impl<R: AsyncBufRead + Unpin> Confirm for TerminalConfirm<R> {
    async fn confirm(&mut self, prompt: &str) -> bool {
        eprint!("{prompt} [y/N] ");
        let mut line = String::new();
        match self.input.read_line(&mut line).await {
            Ok(0) => {
                eprintln!();
                log::info!("input closed, answering {}", if self.on_eof { "yes" } else { "no" });
                self.on_eof
            }
            Ok(_) => is_yes(&line),
            Err(e) => {
                log::warn!("failed to read confirmation: {e}");
                self.on_eof
            }
        }
    }
}

/// Picked at runtime from `--yes`.
pub enum AnyConfirm {
    Auto(AutoConfirm),
    Terminal(TerminalConfirm),
}

impl AnyConfirm {
    /// `on_eof` only applies to the interactive prompt.
    pub fn new(assume_yes: bool, on_eof: bool) -> Self {
        if assume_yes {
            AnyConfirm::Auto(AutoConfirm)
        } else {
            AnyConfirm::Terminal(TerminalConfirm::stdin(on_eof))
        }
    }
}

impl Confirm for AnyConfirm {
    async fn confirm(&mut self, prompt: &str) -> bool {
        match self {
            AnyConfirm::Auto(c) => c.confirm(prompt).await,
            AnyConfirm::Terminal(c) => c.confirm(prompt).await,
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes" | "s" | "si" | "sí"
    )
}
