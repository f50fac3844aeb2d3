//! 被デバッグ側とのコマンド

/// コマンドチャネル上のメッセージ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// 被デバッグ側の初期化完了
    Ready,
    /// ブレークポイントに向けて実行を進める
    Go,
    /// 終了する
    Quit,
}

impl Command {
    /// メッセージ文字列をパースする（大文字小文字は区別しない）
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "ready" => Some(Command::Ready),
            "go" => Some(Command::Go),
            "quit" => Some(Command::Quit),
            _ => None,
        }
    }

    /// 送信用の文字列
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Ready => "READY",
            Command::Go => "GO",
            Command::Quit => "QUIT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("READY"), Some(Command::Ready));
        assert_eq!(Command::parse("ready\n"), Some(Command::Ready));
        assert_eq!(Command::parse(" go "), Some(Command::Go));
        assert_eq!(Command::parse("Quit"), Some(Command::Quit));
        assert_eq!(Command::parse("hello"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[test]
    fn test_as_str_parses_back() {
        for cmd in [Command::Ready, Command::Go, Command::Quit] {
            assert_eq!(Command::parse(cmd.as_str()), Some(cmd));
        }
    }
}
