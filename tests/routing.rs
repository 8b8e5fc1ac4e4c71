use board_link::{
    device::{Board, CARD_MODEL},
    protocol::{FunctionType, Message},
};
use color_eyre::Result;
use pretty_assertions::assert_eq;
use serde_json::json;

mod common;
use common::*;

const PATH: &str = "/dev/ttyUSB0";

#[tokio::test]
async fn temperature_reaches_its_device() -> Result<()> {
    let mut hub = start_hub(vec![sensor("temperature", "uno", FunctionType::DhtTemperature)]);

    hub.registry.connect(Board::new("uno", PATH)).await?;
    let mut board = hub.mock.take_board(PATH).expect("Port was opened");

    board
        .print_line(r#"{"function_name":"DHT_TEMPERATURE","parameters":{"value":21.5}}"#)
        .await?;

    assert_eq!(
        hub.next_value().await?,
        Recorded {
            device: "temperature".into(),
            feature: "temperature-value".into(),
            value: json!(21.5),
        }
    );
    hub.assert_no_value().await;

    Ok(())
}

#[tokio::test]
async fn noise_is_dropped() -> Result<()> {
    let mut hub = start_hub(vec![sensor("temperature", "uno", FunctionType::DhtTemperature)]);

    hub.registry.connect(Board::new("uno", PATH)).await?;
    let mut board = hub.mock.take_board(PATH).expect("Port was opened");

    board.print_line("garbage").await?;
    board.print_line("Booting sketch v3...").await?;
    board.print_line(r#"{"function_name":"#).await?;
    hub.assert_no_value().await;

    // The port keeps working after noise.
    board
        .write_raw(&Message::new(&FunctionType::DhtTemperature, 19).to_line())
        .await?;
    assert_eq!(hub.next_value().await?.value, json!(19));

    Ok(())
}

#[tokio::test]
async fn all_devices_with_the_function_get_the_value() -> Result<()> {
    let mut hub = start_hub(vec![
        sensor("radio-1", "uno", FunctionType::Recv433),
        sensor("humidity", "uno", FunctionType::DhtHumidity),
        sensor("radio-2", "uno", FunctionType::Recv433),
        sensor("radio-elsewhere", "nano", FunctionType::Recv433),
    ]);

    hub.registry.connect(Board::new("uno", PATH)).await?;
    let mut board = hub.mock.take_board(PATH).expect("Port was opened");

    board
        .print_line(r#"{"function_name":"RECV_433","parameters":{"value":42}}"#)
        .await?;

    let first = hub.next_value().await?;
    let second = hub.next_value().await?;

    assert_eq!(
        vec![
            (first.device.as_str(), first.value),
            (second.device.as_str(), second.value)
        ],
        vec![("radio-1", json!(42)), ("radio-2", json!(42))]
    );
    hub.assert_no_value().await;

    Ok(())
}

#[tokio::test]
async fn cards_and_unknown_functions_get_nothing() -> Result<()> {
    let mut hub = start_hub(vec![
        sensor("card", "uno", FunctionType::DhtHumidity).with_model(CARD_MODEL),
        sensor("soil", "uno", FunctionType::Unhandled("SOIL_MOISTURE".into())),
        sensor("humidity", "uno", FunctionType::DhtHumidity),
    ]);

    let info = hub.registry.connect(Board::new("uno", PATH)).await?;
    assert_eq!(info.linked_devices, vec!["soil", "humidity"]);

    let mut board = hub.mock.take_board(PATH).expect("Port was opened");

    board
        .print_line(r#"{"function_name":"SOIL_MOISTURE","parameters":{"value":3}}"#)
        .await?;
    board
        .print_line(r#"{"function_name":"DHT_HUMIDITY","parameters":{"value":55}}"#)
        .await?;

    let value = hub.next_value().await?;
    assert_eq!(value.device, "humidity");
    assert_eq!(value.value, json!(55));
    hub.assert_no_value().await;

    Ok(())
}

#[tokio::test]
async fn lines_split_across_writes_are_delivered_once() -> Result<()> {
    let mut hub = start_hub(vec![sensor("temperature", "uno", FunctionType::DhtTemperature)]);

    hub.registry.connect(Board::new("uno", PATH)).await?;
    let mut board = hub.mock.take_board(PATH).expect("Port was opened");

    let line = b"{\"function_name\":\"DHT_TEMPERATURE\",\"parameters\":{\"value\":-4.25}}\r\n";

    for chunk in line.chunks(5) {
        board.write_raw(chunk).await?;
        tokio::task::yield_now().await;
    }

    assert_eq!(hub.next_value().await?.value, json!(-4.25));
    hub.assert_no_value().await;

    Ok(())
}

#[tokio::test]
async fn values_arrive_in_line_order() -> Result<()> {
    let mut hub = start_hub(vec![sensor("temperature", "uno", FunctionType::DhtTemperature)]);

    hub.registry.connect(Board::new("uno", PATH)).await?;
    let mut board = hub.mock.take_board(PATH).expect("Port was opened");

    let mut burst = vec![];
    for value in 0..20 {
        burst.extend(Message::new(&FunctionType::DhtTemperature, value).to_line());
    }
    board.write_raw(&burst).await?;

    for value in 0..20 {
        assert_eq!(hub.next_value().await?.value, json!(value));
    }

    Ok(())
}

#[tokio::test]
async fn relinking_is_seen_on_reconnect() -> Result<()> {
    let mut hub = start_hub(vec![sensor("temperature", "uno", FunctionType::DhtTemperature)]);

    hub.registry.connect(Board::new("uno", PATH)).await?;
    let mut board = hub.mock.take_board(PATH).expect("Port was opened");

    hub.directory
        .upsert(sensor("outdoor", "uno", FunctionType::DhtTemperature))
        .await;

    board
        .write_raw(&Message::new(&FunctionType::DhtTemperature, 1).to_line())
        .await?;
    assert_eq!(hub.next_value().await?.device, "temperature");
    hub.assert_no_value().await;

    let info = hub.registry.connect(Board::new("uno", PATH)).await?;
    assert_eq!(info.linked_devices, vec!["temperature", "outdoor"]);

    let mut board = hub.mock.take_board(PATH).expect("Port was reopened");
    board
        .write_raw(&Message::new(&FunctionType::DhtTemperature, 2).to_line())
        .await?;

    assert_eq!(hub.next_value().await?.device, "temperature");
    assert_eq!(hub.next_value().await?.device, "outdoor");

    Ok(())
}

#[tokio::test]
async fn boards_are_routed_independently() -> Result<()> {
    let mut hub = start_hub(vec![
        sensor("kitchen", "uno", FunctionType::DhtTemperature),
        sensor("garage", "nano", FunctionType::DhtTemperature),
    ]);

    hub.registry.connect(Board::new("uno", "/dev/ttyUSB0")).await?;
    hub.registry.connect(Board::new("nano", "/dev/ttyUSB1")).await?;

    let mut uno = hub.mock.take_board("/dev/ttyUSB0").expect("Port was opened");
    let mut nano = hub.mock.take_board("/dev/ttyUSB1").expect("Port was opened");

    nano.write_raw(&Message::new(&FunctionType::DhtTemperature, 3).to_line())
        .await?;
    let value = hub.next_value().await?;
    assert_eq!((value.device.as_str(), value.value), ("garage", json!(3)));

    uno.write_raw(&Message::new(&FunctionType::DhtTemperature, 22).to_line())
        .await?;
    let value = hub.next_value().await?;
    assert_eq!((value.device.as_str(), value.value), ("kitchen", json!(22)));

    hub.assert_no_value().await;

    Ok(())
}
