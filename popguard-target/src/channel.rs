//! 行指向のコマンドチャネル

use crate::{Result, TargetError};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

/// ターゲットプロセスとの双方向メッセージチャネル
pub trait CommandChannel {
    /// 1行送信する
    fn send_line(&mut self, line: &str) -> Result<()>;

    /// 1行受信する。相手側が閉じていれば `None`
    fn read_line(&mut self) -> Result<Option<String>>;
}

/// 任意の `BufRead` / `Write` の組による行チャネル
pub struct LineChannel<R, W> {
    reader: R,
    writer: W,
    read_timeout: Option<Duration>,
}

/// Unixドメインソケット上の行チャネル
pub type UnixChannel = LineChannel<BufReader<UnixStream>, UnixStream>;

impl<R: BufRead, W: Write> LineChannel<R, W> {
    /// 行チャネルを作成する
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            read_timeout: None,
        }
    }
}

impl UnixChannel {
    /// ソケットから行チャネルを作成する
    pub fn from_stream(stream: UnixStream) -> Result<Self> {
        let writer = stream.try_clone()?;
        Ok(Self::new(BufReader::new(stream), writer))
    }

    /// 接続済みのチャネルの組を作成する
    pub fn pair() -> Result<(Self, Self)> {
        let (a, b) = UnixStream::pair()?;
        Ok((Self::from_stream(a)?, Self::from_stream(b)?))
    }

    /// 受信タイムアウトを設定する
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.reader.get_ref().set_read_timeout(timeout)?;
        self.read_timeout = timeout;
        Ok(())
    }
}

impl<R: BufRead, W: Write> CommandChannel for LineChannel<R, W> {
    fn send_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut buf = String::new();
        match self.reader.read_line(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf.trim_end_matches(['\r', '\n']).to_string())),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Err(TargetError::Timeout(self.read_timeout.unwrap_or_default()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
