//! Process signal wiring
//!
//! Translates SIGINT/SIGTERM (or the console control event on Windows)
//! into a cancellation of the pipeline's token. Handlers only flip an
//! atomic flag, which is async-signal-safe; the loop observes it at
//! its next iteration boundary.

use deskcam_core::CancelToken;
use std::sync::OnceLock;

static TOKEN: OnceLock<CancelToken> = OnceLock::new();

fn cancel_installed_token() {
    if let Some(token) = TOKEN.get() {
        token.cancel();
    }
}

/// Install shutdown handlers that cancel `token`. May be called once;
/// later calls are ignored.
pub fn install(token: CancelToken) {
    if TOKEN.set(token).is_err() {
        return;
    }

    #[cfg(unix)]
    unsafe {
        extern "C" fn handler(_sig: libc::c_int) {
            cancel_installed_token();
        }
        let handler = handler as extern "C" fn(libc::c_int);
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
    }

    #[cfg(windows)]
    unsafe {
        use windows::Win32::Foundation::BOOL;
        use windows::Win32::System::Console::SetConsoleCtrlHandler;

        unsafe extern "system" fn handler(_ctrl_type: u32) -> BOOL {
            cancel_installed_token();
            BOOL(1)
        }
        let _ = SetConsoleCtrlHandler(Some(handler), BOOL(1));
    }
}

#[cfg(test)]
mod tests {
    use super::{install, TOKEN};
    use deskcam_core::CancelToken;

    #[test]
    fn installed_token_is_cancelled_by_handler() {
        let token = CancelToken::new();
        install(token.clone());
        // Second install must not replace the first token
        install(CancelToken::new());

        assert!(!token.is_cancelled());
        super::cancel_installed_token();
        assert!(token.is_cancelled());
        assert!(TOKEN.get().is_some());
    }
}
