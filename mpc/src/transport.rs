use std::time::Duration;

use futures::{
    stream::{SplitSink, SplitStream},
    Sink, SinkExt, Stream, StreamExt,
};
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio_serde::formats::Bincode;
use tokio_util::codec::LengthDelimitedCodec;
use tracing::warn;

use crate::error::{AbortReason, MpcError, Result};

/// Default bound on a single exchange with a peer.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

fn aborted(peer: usize, reason: AbortReason) -> MpcError {
    warn!(peer, ?reason, "Round trip aborted");
    MpcError::ProtocolAborted { peer, reason }
}

/// Connection to one peer, split so that sending and receiving can wait concurrently.
struct Peer<T, Channel> {
    outgoing: SplitSink<Channel, T>,
    incoming: SplitStream<Channel>,
}

impl<T, E, Channel> Peer<T, Channel>
where
    Channel: Stream<Item = Result<T, E>> + Sink<T> + Unpin,
{
    async fn send(&mut self, id: usize, msg: T) -> Result<()> {
        self.outgoing
            .send(msg)
            .await
            .map_err(|_| aborted(id, AbortReason::SendFailed))
    }

    async fn receive(&mut self, id: usize) -> Result<T> {
        match self.incoming.next().await {
            Some(Ok(msg)) => Ok(msg),
            _ => Err(aborted(id, AbortReason::Disconnected)),
        }
    }

    async fn exchange(&mut self, id: usize, msg: T) -> Result<T> {
        let Self { outgoing, incoming } = self;
        let send = async {
            outgoing
                .send(msg)
                .await
                .map_err(|_| aborted(id, AbortReason::SendFailed))
        };
        let receive = async {
            match incoming.next().await {
                Some(Ok(msg)) => Ok(msg),
                _ => Err(aborted(id, AbortReason::Disconnected)),
            }
        };
        let (_, received) = futures::try_join!(send, receive)?;
        Ok(received)
    }
}

/// Point-to-point connections of one party to every other party.
/// Every wait is bounded by the configured timeout.
pub struct MultipartyTransport<T, Channel> {
    peers: Vec<Option<Peer<T, Channel>>>,
    party_id: usize,
    timeout: Duration,
}

impl<T, Channel> MultipartyTransport<T, Channel>
where
    Channel: Stream + Sink<T>,
{
    /// Wrap one connection per party. Entry `party_id` must be None, all others present.
    pub fn new(channels: impl IntoIterator<Item = Option<Channel>>, party_id: usize) -> Self {
        let peers: Vec<_> = channels
            .into_iter()
            .map(|channel| {
                channel.map(|channel| {
                    let (outgoing, incoming) = channel.split();
                    Peer { outgoing, incoming }
                })
            })
            .collect();
        if let Some(missing) = (0..peers.len()).find(|&id| id != party_id && peers[id].is_none()) {
            panic!("No connection to party {}", missing);
        }
        Self {
            peers,
            party_id,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl<T, Channel> MultipartyTransport<T, Channel> {
    /// Bound every send and receive by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn num_parties(&self) -> usize {
        self.peers.len()
    }

    pub fn party_id(&self) -> usize {
        self.party_id
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<T, E, Channel> MultipartyTransport<T, Channel>
where
    T: Clone,
    Channel: Stream<Item = Result<T, E>> + Sink<T> + Unpin,
{
    pub async fn send_to(&mut self, other_id: usize, msg: T) -> Result<()> {
        let timeout = self.timeout;
        let peer = self.peer(other_id);
        bounded(other_id, timeout, peer.send(other_id, msg)).await
    }

    pub async fn receive_from(&mut self, other_id: usize) -> Result<T> {
        let timeout = self.timeout;
        let peer = self.peer(other_id);
        bounded(other_id, timeout, peer.receive(other_id)).await
    }

    /// Send the same message to every peer and receive one message from each.
    pub async fn exchange_with_all(&mut self, msg: T) -> Result<Vec<(usize, T)>> {
        let msgs = vec![msg; self.num_parties()];
        self.exchange_with_each(msgs).await
    }

    /// Send `msgs[j]` to every peer j and receive one message from each, all concurrently.
    /// Entry of current party is ignored. Output is ordered by party ID.
    pub async fn exchange_with_each(&mut self, msgs: Vec<T>) -> Result<Vec<(usize, T)>> {
        assert_eq!(msgs.len(), self.num_parties(), "One message per party expected");
        let timeout = self.timeout;
        let exchanges = self
            .peers
            .iter_mut()
            .zip(msgs)
            .enumerate()
            .filter_map(|(id, (peer, msg))| peer.as_mut().map(|peer| (id, peer, msg)))
            .map(|(id, peer, msg)| async move {
                let received = bounded(id, timeout, peer.exchange(id, msg)).await?;
                Ok::<_, MpcError>((id, received))
            });
        futures::future::try_join_all(exchanges).await
    }

    fn peer(&mut self, other_id: usize) -> &mut Peer<T, Channel> {
        assert_ne!(other_id, self.party_id, "Party cannot talk to itself");
        match self.peers[other_id].as_mut() {
            Some(peer) => peer,
            None => unreachable!("Connections to all peers are checked on creation"),
        }
    }
}

async fn bounded<T>(
    peer: usize,
    timeout: Duration,
    future: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, future)
        .await
        .unwrap_or_else(|_| Err(aborted(peer, AbortReason::Timeout)))
}

/// Channel of length-delimited bincode frames over a byte stream.
pub type FramedBincode<T, C> =
    tokio_serde::Framed<tokio_util::codec::Framed<C, LengthDelimitedCodec>, T, T, Bincode<T, T>>;

/// In-process framed channel.
pub type BincodeDuplex<T> = FramedBincode<T, DuplexStream>;

/// Frame a byte stream into bincode messages. Frames up to 1 GiB are accepted.
pub fn frame_bincode<T, C>(stream: C) -> FramedBincode<T, C>
where
    C: AsyncRead + AsyncWrite,
{
    let frames = LengthDelimitedCodec::builder()
        .max_frame_length(1 << 30)
        .new_framed(stream);
    tokio_serde::Framed::new(frames, Bincode::default())
}

/// Both ends of an in-process framed channel.
pub fn bincode_pair<T>(max_buf_size: usize) -> (BincodeDuplex<T>, BincodeDuplex<T>) {
    let (left, right) = tokio::io::duplex(max_buf_size);
    (frame_bincode(left), frame_bincode(right))
}

/// Fully connected in-process transports of `num_parties` parties, ordered by party ID.
pub fn mock_multiparty_channels<T>(
    num_parties: usize,
    max_buf_size: usize,
) -> Vec<MultipartyTransport<T, BincodeDuplex<T>>>
where
    T: Clone + Serialize + DeserializeOwned + Unpin,
{
    let mut links: Vec<Vec<Option<BincodeDuplex<T>>>> = (0..num_parties)
        .map(|_| std::iter::repeat_with(|| None).take(num_parties).collect())
        .collect();
    for (i, j) in (0..num_parties).flat_map(|i| (i + 1..num_parties).map(move |j| (i, j))) {
        let (to_j, to_i) = bincode_pair(max_buf_size);
        links[i][j] = Some(to_j);
        links[j][i] = Some(to_i);
    }
    links
        .into_iter()
        .enumerate()
        .map(|(party_id, row)| MultipartyTransport::new(row, party_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exchange_with_each() {
        let transports = mock_multiparty_channels::<Vec<u64>>(3, 1 << 16);
        let results = futures::future::join_all(transports.into_iter().map(|mut t| async move {
            let me = t.party_id() as u64;
            let msgs = (0..3).map(|to| vec![me, to as u64]).collect();
            t.exchange_with_each(msgs).await.unwrap()
        }))
        .await;

        for (me, received) in results.into_iter().enumerate() {
            let expected: Vec<_> = (0..3)
                .filter(|&from| from != me)
                .map(|from| (from, vec![from as u64, me as u64]))
                .collect();
            assert_eq!(received, expected);
        }
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let mut transports = mock_multiparty_channels::<String>(2, 1 << 16);
        let mut second = transports.pop().unwrap();
        let mut first = transports.pop().unwrap();
        first.send_to(1, "hello".to_string()).await.unwrap();
        assert_eq!(second.receive_from(0).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_timeout() {
        let mut transports = mock_multiparty_channels::<u32>(2, 1 << 16);
        let _silent_peer = transports.pop().unwrap();
        let mut first = transports
            .pop()
            .unwrap()
            .with_timeout(Duration::from_millis(50));
        let result = first.exchange_with_all(7).await;
        assert!(matches!(
            result,
            Err(MpcError::ProtocolAborted {
                peer: 1,
                reason: AbortReason::Timeout
            })
        ));
    }

    #[tokio::test]
    async fn test_disconnected_peer() {
        let mut transports = mock_multiparty_channels::<u32>(2, 1 << 16);
        drop(transports.pop());
        let mut first = transports.pop().unwrap();
        let result = first.receive_from(1).await;
        assert!(matches!(
            result,
            Err(MpcError::ProtocolAborted {
                peer: 1,
                reason: AbortReason::Disconnected
            })
        ));
    }

    #[test]
    #[should_panic(expected = "No connection to party 1")]
    fn test_missing_connection() {
        let (a, _b) = bincode_pair::<u32>(16);
        MultipartyTransport::<u32, _>::new(vec![None, None, Some(a)], 0);
    }
}
