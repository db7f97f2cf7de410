mod deserialize;
pub mod msg;
mod protocol;
mod receiver;
mod sender;
mod serialize;
pub mod specs;

use tokio::io::{AsyncRead, AsyncWrite};

pub use deserialize::Deserialize;
pub use receiver::GolReceiver;
pub use sender::GolSender;
pub use serialize::Serialize;

type LenType = u64;
const LEN_TYPE_SIZE: usize = size_of::<LenType>();

/// Creates both `GolReceiver` and `GolSender` network channel parts.
///
/// Given a writer and reader creates and returns both ends of the
/// communication.
///
/// # Arguments
/// * `rx` - An async readable.
/// * `tx` - An async writable.
///
/// # Returns
/// A communication stream in the form of a receiver and a sender.
pub fn channel<R, W>(rx: R, tx: W) -> (GolReceiver<R>, GolSender<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (GolReceiver::new(rx), GolSender::new(tx))
}
