mod client;
mod replica_actor;

pub(crate) use client::ActorClient;
pub(crate) use client::ActorExited;
pub(crate) use client::Callback;
pub(crate) use client::Event;
pub(crate) use client::WeakActorClient;
pub(crate) use replica_actor::ReplicaActor;
