use log::error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

const ACTOR_CHANNEL_SIZE: usize = 64;

/// An actor owns its state and processes messages one at a time.
pub trait Actor: Sized + Send + 'static {
    type Message: Send + 'static;
    type Options;
    type Error: std::fmt::Display + Send + From<mpsc::error::SendError<Self::Message>>;

    fn name() -> &'static str;
    fn new(options: Self::Options) -> Self;
    fn start(&mut self, handle: &ActorHandle<Self>) -> Result<(), Self::Error>;
    fn receive(
        &mut self,
        message: Self::Message,
        handle: &ActorHandle<Self>,
    ) -> Result<ActorAction, Self::Error>;
    fn stop(self) -> Result<(), Self::Error>;
}

pub enum ActorAction {
    Continue,
    Stop,
}

pub struct ActorHandle<T>
where
    T: Actor,
{
    sender: mpsc::Sender<T::Message>,
    stopped: watch::Receiver<bool>,
}

impl<T> Clone for ActorHandle<T>
where
    T: Actor,
{
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            stopped: self.stopped.clone(),
        }
    }
}

impl<T: Actor> ActorHandle<T> {
    async fn run(
        mut actor: T,
        handle: ActorHandle<T>,
        mut receiver: mpsc::Receiver<T::Message>,
    ) -> Result<(), T::Error> {
        actor.start(&handle)?;
        while let Some(message) = receiver.recv().await {
            match actor.receive(message, &handle)? {
                ActorAction::Continue => {}
                ActorAction::Stop => break,
            }
        }
        actor.stop()
    }

    pub async fn send(&self, message: T::Message) -> Result<(), T::Error> {
        self.sender.send(message).await.map_err(T::Error::from)
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow() || self.sender.is_closed()
    }

    pub async fn wait_for_stop(mut self) {
        // We ignore the receiver error since the sender must have been dropped in this case,
        // which means the actor has stopped.
        let _ = self.stopped.wait_for(|x| *x).await;
    }
}

/// Spawns actors on the current tokio runtime and keeps track of them
/// so that the owner can wait for all of them to stop.
pub struct ActorSystem {
    tasks: JoinSet<()>,
}

impl ActorSystem {
    pub fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
        }
    }

    pub fn spawn<T: Actor>(&mut self, options: T::Options) -> ActorHandle<T> {
        let (tx, rx) = mpsc::channel(ACTOR_CHANNEL_SIZE);
        let (stopped_tx, stopped_rx) = watch::channel::<bool>(false);
        let actor = T::new(options);
        let handle = ActorHandle {
            sender: tx,
            stopped: stopped_rx,
        };
        let runner = handle.clone();
        self.tasks.spawn(async move {
            if let Err(e) = ActorHandle::run(actor, runner, rx).await {
                error!("{} actor failed: {e}", T::name());
            }
            let _ = stopped_tx.send(true);
        });
        handle
    }

    pub async fn join(&mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                error!("failed to join actor task: {e}");
            }
        }
    }
}

impl Default for ActorSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::{mpsc, oneshot};

    use super::*;

    struct TestActor {
        prefix: String,
    }

    #[derive(Debug)]
    struct TestError;

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error")
        }
    }

    impl<T> From<mpsc::error::SendError<T>> for TestError {
        fn from(_: mpsc::error::SendError<T>) -> Self {
            Self
        }
    }

    enum TestMessage {
        Echo {
            value: String,
            reply: oneshot::Sender<String>,
        },
        Stop,
    }

    impl Actor for TestActor {
        type Message = TestMessage;
        type Options = String;
        type Error = TestError;

        fn name() -> &'static str {
            "test"
        }

        fn new(options: Self::Options) -> Self {
            Self { prefix: options }
        }

        fn start(&mut self, _: &ActorHandle<Self>) -> Result<(), Self::Error> {
            Ok(())
        }

        fn receive(
            &mut self,
            message: Self::Message,
            _: &ActorHandle<Self>,
        ) -> Result<ActorAction, Self::Error> {
            match message {
                TestMessage::Echo { value, reply } => {
                    let _ = reply.send(format!("{}{}", self.prefix, value.to_uppercase()));
                    Ok(ActorAction::Continue)
                }
                TestMessage::Stop => Ok(ActorAction::Stop),
            }
        }

        fn stop(self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_actor_handle_send() {
        let mut system = ActorSystem::new();
        let handle = system.spawn::<TestActor>("> ".to_string());
        assert!(!handle.is_stopped());
        let (tx, rx) = oneshot::channel();
        let result = handle
            .send(TestMessage::Echo {
                value: "hello".to_string(),
                reply: tx,
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(rx.await, Ok("> HELLO".to_string()));
    }

    #[tokio::test]
    async fn test_actor_system_join() {
        let mut system = ActorSystem::new();
        let first = system.spawn::<TestActor>(String::new());
        let second = system.spawn::<TestActor>(String::new());
        assert!(first.send(TestMessage::Stop).await.is_ok());
        assert!(second.send(TestMessage::Stop).await.is_ok());
        system.join().await;
        assert!(first.is_stopped());
        // Multiple handles should be able to wait for the actor to stop.
        first.clone().wait_for_stop().await;
        second.wait_for_stop().await;
    }
}
