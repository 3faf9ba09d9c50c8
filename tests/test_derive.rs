use tokio_hsm::Event;

#[derive(Debug, Event)]
enum Player {
    Play,
    Seek(u32),
    #[event(name = "volume")]
    SetVolume {
        level: u8,
    },
}

#[derive(Debug, Event)]
#[event(reply = "Option<String>")]
enum Query {
    Lookup(String),
}

#[derive(Debug, Event)]
enum Wrapped<T: std::fmt::Debug + Send + Sync + 'static> {
    Item(T),
    Empty,
}

#[derive(Debug, Event)]
enum Never {}

fn reply_of<E: Event>(_: &E) -> std::any::TypeId
where
    E::Reply: 'static,
{
    std::any::TypeId::of::<E::Reply>()
}

#[test]
fn test_variant_names() {
    assert_eq!(Player::Play.name(), "Play");
    assert_eq!(Player::Seek(10).name(), "Seek");
    assert_eq!(Player::SetVolume { level: 3 }.name(), "volume");
    assert_eq!(Player::names(), &["Play", "Seek", "volume"]);
}

#[test]
fn test_reply_type() {
    assert_eq!(reply_of(&Player::Play), std::any::TypeId::of::<()>());
    assert_eq!(
        reply_of(&Query::Lookup("k".into())),
        std::any::TypeId::of::<Option<String>>()
    );
}

#[test]
fn test_generic_and_empty_enums() {
    assert_eq!(Wrapped::Item(1u8).name(), "Item");
    assert_eq!(Wrapped::<u8>::Empty.name(), "Empty");
    assert!(Never::names().is_empty());
}
