//! End-to-end SMPP delivery test against an in-process mock SMSC.
//!
//! The mock accepts one bind, answers submit_sm with a fixed external id and
//! later pushes a deliver_sm carrying a DELIVRD receipt, exercising the full
//! pool → submit → correlate → receipt pipeline.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::net::TcpListener;

use smshubd::bootstrap::Hub;
use smshubd::config::Config;
use smshubd::smpp::codec::{encode_cstring, finish_pdu, start_pdu, CommandId, CommandStatus};
use smshubd::smpp::connection::Connection;
use smshubd::smpp::pdu::{
    DeliverSm, EnquireLinkResponse, Frame, SubmitSmResponse, UnbindResponse,
};

const KEY_HEADER: &str = "ocp-apim-subscription-key";
const EXTERNAL_ID: &str = "EXT-0001";

/// Run a one-connection mock SMSC: bind, answer submits, emit a DLR after
/// the first submit when `send_dlr` is set.
async fn run_mock_smsc(listener: TcpListener, send_dlr: bool) {
    let (socket, _) = listener.accept().await.expect("accept");
    let mut conn = Connection::new(Box::new(socket));

    loop {
        let frame = match conn.read_frame().await {
            Ok(Some(frame)) => frame,
            _ => return,
        };

        match frame {
            // The hub's parser surfaces inbound binds as opaque frames with
            // the header intact, which is all the mock needs.
            Frame::Unknown { header, .. }
                if matches!(
                    header.command_id,
                    CommandId::BindTransceiver
                        | CommandId::BindTransmitter
                        | CommandId::BindReceiver
                ) =>
            {
                let resp_id = match header.command_id {
                    CommandId::BindTransmitter => CommandId::BindTransmitterResp,
                    CommandId::BindReceiver => CommandId::BindReceiverResp,
                    _ => CommandId::BindTransceiverResp,
                };

                let mut buf = start_pdu(resp_id, CommandStatus::Ok, header.sequence_number);
                encode_cstring(&mut buf, "mock-smsc", 16);
                conn.write_bytes(&finish_pdu(buf)).await.expect("bind resp");
            }

            Frame::SubmitSm(submit) => {
                let resp = SubmitSmResponse::new(submit.sequence_number, EXTERNAL_ID);
                conn.write_frame(&Frame::SubmitSmResp(resp))
                    .await
                    .expect("submit resp");

                if send_dlr {
                    tokio::time::sleep(Duration::from_millis(200)).await;

                    let receipt = DeliverSm {
                        sequence_number: 1000,
                        service_type: String::new(),
                        source_addr: "12345".into(),
                        dest_addr: submit.dest_addr.clone(),
                        esm_class: 0x04,
                        registered_delivery: 0,
                        data_coding: 0,
                        short_message: format!(
                            "id:{EXTERNAL_ID} sub:001 dlvrd:001 submit date:2406151230 \
                             done date:2406151231 stat:DELIVRD err:000 text:hi"
                        )
                        .into_bytes(),
                        tlvs: Vec::new(),
                    };
                    conn.write_frame(&Frame::DeliverSm(Box::new(receipt)))
                        .await
                        .expect("deliver_sm");
                }
            }

            Frame::EnquireLink(el) => {
                let resp = Frame::EnquireLinkResp(EnquireLinkResponse::new(el.sequence_number));
                conn.write_frame(&resp).await.expect("enquire resp");
            }

            Frame::Unbind(unbind) => {
                let resp = Frame::UnbindResp(UnbindResponse::new(unbind.sequence_number));
                let _ = conn.write_frame(&resp).await;
                return;
            }

            // deliver_sm_resp acks from the hub
            _ => {}
        }
    }
}

async fn start_hub(smsc_port: u16) -> (Hub, String, reqwest::Client) {
    let yaml = format!(
        r#"
tenants:
  telco-key:
    name: Telco
    smpp:
      host: 127.0.0.1
      port: {smsc_port}
      system_id: hub
      password: pw
      source_address: "12345"
      inactivity_timeout: 5s
      pool:
        min_connections: 1
        max_connections: 2
        connect_timeout: 5s
"#
    );

    let config = Config::from_yaml(&yaml).expect("config");
    let mut hub = Hub::new(config).expect("hub");
    hub.start().expect("start");

    let router = hub.api_router();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    (hub, format!("http://{addr}"), reqwest::Client::new())
}

async fn wait_for_status(
    client: &reqwest::Client,
    base_url: &str,
    id: &str,
    expected: &str,
    timeout: Duration,
) -> Value {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let status: Value = client
            .get(format!("{base_url}/api/messages/{id}/status"))
            .header(KEY_HEADER, "telco-key")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        if status["status"] == expected {
            return status;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("message {id} never reached {expected}, last: {status}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn test_smpp_submit_reaches_sent_with_external_id() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(run_mock_smsc(listener, false));

    let (_hub, base_url, client) = start_hub(port).await;

    let body: Value = client
        .post(format!("{base_url}/api/message"))
        .header(KEY_HEADER, "telco-key")
        .json(&json!({
            "recipient": "+1234567890",
            "message": "hello via smpp",
            "channelType": "SMPP",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let id = body["messageId"].as_str().unwrap();
    let status = wait_for_status(&client, &base_url, id, "Sent", Duration::from_secs(10)).await;

    assert_eq!(status["externalMessageId"], EXTERNAL_ID);
    assert_eq!(status["channelType"], "SMPP");
}

#[tokio::test]
async fn test_smpp_delivery_receipt_transitions_to_delivered() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(run_mock_smsc(listener, true));

    let (_hub, base_url, client) = start_hub(port).await;

    let body: Value = client
        .post(format!("{base_url}/api/message"))
        .header(KEY_HEADER, "telco-key")
        .json(&json!({
            "recipient": "+1234567890",
            "message": "receipt please",
            "channelType": "SMPP",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let id = body["messageId"].as_str().unwrap();

    // The DLR arrives ~200ms after the submit response and flips the row
    // from Sent to Delivered.
    let status =
        wait_for_status(&client, &base_url, id, "Delivered", Duration::from_secs(10)).await;

    assert_eq!(status["externalMessageId"], EXTERNAL_ID);
}
