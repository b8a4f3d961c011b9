use configs::{EventBinding, RabbitMQConfigs};
use rabbitmq::{
    message::AMQP_JSON_CONTENT_TYPE,
    mocks::{BrokerEvent, FakeBroker},
    Connector, TaggedMessage,
};
use std::{sync::Arc, time::Duration};

#[tokio::test(start_paused = true)]
async fn relays_messages_across_a_reconnect() {
    let broker = FakeBroker::new();
    let (mut connector, mut events) = Connector::new(Arc::new(broker.clone()));
    connector.configure(RabbitMQConfigs {
        events: vec![
            EventBinding::new("orders", "orders", "orders_queue"),
            EventBinding::new("audit", "audit", "audit_queue").publish_only(),
        ],
        reconnection_interval: Duration::from_millis(500),
        ..Default::default()
    });
    let connector = Arc::new(connector);

    let run = tokio::spawn({
        let connector = connector.clone();
        async move { connector.run().await }
    });

    events.connected.recv().await.unwrap();
    broker.deliver("orders_queue", b"{\"id\": 1}").await;
    assert_eq!(
        events.messages.recv().await.unwrap(),
        TaggedMessage::new("orders", b"{\"id\":1}".to_vec())
    );

    broker.fail_connection(320, "CONNECTION_FORCED");
    events.disconnected.recv().await.unwrap();
    events.connected.recv().await.unwrap();

    broker.deliver("orders_queue", b"{\"id\": 2}").await;
    assert_eq!(
        events.messages.recv().await.unwrap(),
        TaggedMessage::new("orders", b"{\"id\":2}".to_vec())
    );
    assert!(connector.publish("audit", b"{}", AMQP_JSON_CONTENT_TYPE).await);

    tokio::time::sleep(Duration::from_millis(10)).await;
    connector.shutdown();
    run.await.unwrap();

    let log = broker.events();
    assert_eq!(
        log.iter()
            .filter(|event| matches!(event, BrokerEvent::Dialed { .. }))
            .count(),
        2
    );
    assert!(!log.contains(&BrokerEvent::QueueDeclared("audit_queue".to_owned())));
    assert_eq!(broker.acked().len(), 2);
    assert!(!connector.is_connected().await);
}
