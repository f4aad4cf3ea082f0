use bitcoin::psbt::PsbtSighashType;
use bitcoin::{Amount, TapSighashType};
use tapswap_sdk::anchor::{decode_psbt, encode_psbt, is_complete, txid};
use tapswap_sdk::invariant::InvariantViolation;
use tapswap_sdk::testing::{MockSdk, mock_sdk, sell_request, test_key};
use tapswap_sdk::{
    BuyOrderEnvelope, BuyOrderRequest, CoinConstraint, Envelope, Error, SellOrderEnvelope,
    SwapOutPoint, VirtualPacket,
};

const COURIER: &str = "localhost:10029";

fn seller(coin_amount: u64) -> MockSdk {
    mock_sdk(0x10, coin_amount)
}

fn buyer() -> MockSdk {
    mock_sdk(0x20, 0)
}

fn buy_request(sell_order: String, fee_rate: u32) -> BuyOrderRequest {
    BuyOrderRequest {
        sell_order,
        fee_rate,
        proof_courier_host: COURIER.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Sell order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sell_order_keeps_anchor_shape_after_trim() {
    let seller = seller(10);
    let encoded = seller
        .build_sell_order(&sell_request(10, 5000, 10))
        .await
        .unwrap();

    let envelope = SellOrderEnvelope::decode(&encoded).unwrap();
    let packet = VirtualPacket::from_bytes(&envelope.vpacket).unwrap();
    assert_eq!(packet.inputs.len(), 1);
    assert!((1..=2).contains(&packet.outputs.len()));
    let asset = packet.outputs[0].asset.as_ref().expect("prepared output");
    assert_eq!(asset.script_key, packet.outputs[0].script_key);

    let anchor = decode_psbt(&envelope.anchor_psbt).unwrap();
    assert_eq!(anchor.inputs.len(), packet.inputs.len());
    assert_eq!(anchor.outputs.len(), packet.outputs.len() + 1);
    assert_eq!(anchor.unsigned_tx.output[0].value, Amount::from_sat(5000));
    assert_eq!(
        anchor.inputs[0].sighash_type,
        Some(PsbtSighashType::from(TapSighashType::SinglePlusAnyoneCanPay))
    );
    assert!(anchor.inputs[0].tap_key_sig.is_some());
    assert_eq!(
        packet.inputs[0].sighash().unwrap(),
        TapSighashType::NonePlusAnyoneCanPay
    );

    assert_eq!(
        seller.wallet().calls(),
        vec![
            "derive_script_key",
            "derive_internal_key",
            "new_address",
            "list_owned_addresses",
            "sign_psbt",
        ]
    );
    assert_eq!(
        seller.assets().calls(),
        vec!["fund_virtual", "sign_virtual", "commit"]
    );
}

#[tokio::test]
async fn sell_order_with_change_anchors_split_root() {
    let seller = seller(15);
    let encoded = seller
        .build_sell_order(&sell_request(10, 5000, 10))
        .await
        .unwrap();

    let envelope = SellOrderEnvelope::decode(&encoded).unwrap();
    let packet = VirtualPacket::from_bytes(&envelope.vpacket).unwrap();
    assert_eq!(packet.outputs.len(), 2);
    assert_eq!(packet.outputs[1].amount, 5);
    let anchor = decode_psbt(&envelope.anchor_psbt).unwrap();
    assert_eq!(anchor.outputs.len(), 3);
}

#[tokio::test]
async fn sell_order_honours_coin_constraint() {
    let seller = seller(10);
    let pinned: SwapOutPoint = format!("{}:2", "cd".repeat(32)).parse().unwrap();
    let mut request = sell_request(10, 5000, 10);
    request.coin = Some(CoinConstraint {
        anchor_outpoint: pinned,
        internal_key: test_key(9),
    });

    let encoded = seller.build_sell_order(&request).await.unwrap();
    let envelope = SellOrderEnvelope::decode(&encoded).unwrap();
    let packet = VirtualPacket::from_bytes(&envelope.vpacket).unwrap();
    assert_eq!(packet.inputs[0].prev_id.out_point, pinned.to_outpoint());
    let anchor = decode_psbt(&envelope.anchor_psbt).unwrap();
    assert_eq!(anchor.unsigned_tx.input[0].previous_output, pinned.to_outpoint());
}

#[tokio::test]
async fn sell_order_rejects_excess_fee_rate_without_calls() {
    let seller = seller(10);
    let err = seller
        .build_sell_order(&sell_request(10, 5000, 501))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::FeeRateExceeded {
            fee_rate: 501,
            max: 500
        }
    ));
    assert!(err.is_validation());
    assert!(seller.wallet().calls().is_empty());
    assert!(seller.assets().calls().is_empty());
}

#[tokio::test]
async fn sell_order_validates_inputs_first() {
    let seller = seller(10);
    let mut bad_id = sell_request(10, 5000, 10);
    bad_id.asset_id = "a1".repeat(31);
    assert!(matches!(
        seller.build_sell_order(&bad_id).await,
        Err(Error::InvalidAssetId(_))
    ));
    assert!(matches!(
        seller.build_sell_order(&sell_request(0, 5000, 10)).await,
        Err(Error::ZeroAmount)
    ));
    assert!(matches!(
        seller.build_sell_order(&sell_request(10, 0, 10)).await,
        Err(Error::ZeroPrice)
    ));
    assert!(seller.wallet().calls().is_empty());
}

#[tokio::test]
async fn sell_order_aborts_on_commit_failure() {
    let seller = seller(10);
    seller.assets().fail_on("commit");
    let err = seller
        .build_sell_order(&sell_request(10, 5000, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Service { op: "commit", .. }));
    assert!(!seller.wallet().calls().contains(&"sign_psbt"));
}

#[tokio::test]
async fn sell_order_reports_key_derivation_failure() {
    let seller = seller(10);
    seller.wallet().fail_on("derive_internal_key");
    let err = seller
        .build_sell_order(&sell_request(10, 5000, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::KeyDerivation(_)));
    assert!(seller.assets().calls().is_empty());
}

#[tokio::test]
async fn sell_order_rejects_overdrawn_funding() {
    let seller = seller(3);
    let err = seller
        .build_sell_order(&sell_request(10, 5000, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Service { op: "fund_virtual", .. }));
}

#[tokio::test]
async fn sell_order_rejects_signed_packet_without_inputs() {
    let seller = seller(10);
    seller
        .assets()
        .tamper_signed_virtual(|packet| packet.inputs.clear());

    let err = seller
        .build_sell_order(&sell_request(10, 5000, 10))
        .await
        .unwrap_err();
    match err {
        Error::Invariant(InvariantViolation::Length {
            what,
            expected,
            actual,
        }) => {
            assert_eq!(what, "signed virtual inputs");
            assert_eq!(expected, 1);
            assert_eq!(actual, 0);
        }
        other => panic!("expected invariant violation, got {other:?}"),
    }
    assert_eq!(seller.assets().calls(), vec!["fund_virtual", "sign_virtual"]);
    assert!(!seller.wallet().calls().contains(&"sign_psbt"));
}

#[tokio::test]
async fn sell_order_rejects_signed_packet_with_foreign_recipient() {
    let seller = seller(10);
    seller
        .assets()
        .tamper_signed_virtual(|packet| packet.outputs[0].script_key = test_key(0x99));

    let err = seller
        .build_sell_order(&sell_request(10, 5000, 10))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Invariant(InvariantViolation::Mismatch {
            what: "output 0 script key",
            ..
        })
    ));
    assert!(!seller.assets().calls().contains(&"commit"));
}

// ---------------------------------------------------------------------------
// Buy order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn end_to_end_swap() {
    let seller = seller(10);
    let buyer = buyer();

    let sell_order = seller
        .build_sell_order(&sell_request(10, 5000, 10))
        .await
        .unwrap();
    let buy_order = buyer
        .build_buy_order(&buy_request(sell_order, 10))
        .await
        .unwrap();

    let envelope = BuyOrderEnvelope::decode(&buy_order).unwrap();
    let finalized = decode_psbt(&envelope.anchor_psbt).unwrap();
    assert!(is_complete(&finalized));
    assert_eq!(finalized.inputs.len(), 2);

    let outpoint: SwapOutPoint = envelope.outpoint.parse().unwrap();
    assert_eq!(outpoint.index(), 1);
    assert_eq!(outpoint.txid(), txid(&finalized));
    let (txid_hex, index) = envelope.outpoint.split_once(':').unwrap();
    assert_eq!(txid_hex.len(), 64);
    assert_eq!(index, "1");

    let packet = VirtualPacket::from_bytes(&envelope.vpacket).unwrap();
    assert_eq!(envelope.script_key, packet.outputs[0].script_key.serialize().to_vec());
    let courier = packet.outputs[0].proof_courier_addr.as_ref().unwrap();
    assert_eq!(courier.to_string(), format!("universerpc://{COURIER}"));
    assert_eq!(
        finalized.outputs[1].tap_internal_key,
        packet.outputs[0].anchor_internal_key.map(|k| k.x_only_public_key().0)
    );

    let published = seller.publish(&buy_order).await.unwrap();
    assert_eq!(published, txid(&finalized).to_string());
    let requests = seller.assets().published();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.change_output_index, envelope.commit.change_output_index);
    assert_eq!(request.virtual_packets.len(), 1);
    assert_eq!(
        VirtualPacket::from_bytes(&request.virtual_packets[0]).unwrap(),
        packet
    );
}

#[tokio::test]
async fn buyer_preserves_seller_witnesses() {
    let seller = seller(15);
    let buyer = buyer();

    let sell_order = seller
        .build_sell_order(&sell_request(10, 5000, 10))
        .await
        .unwrap();
    let sold = SellOrderEnvelope::decode(&sell_order).unwrap();
    let before = VirtualPacket::from_bytes(&sold.vpacket)
        .unwrap()
        .snapshot_witnesses();
    assert!(before.iter().flatten().flatten().any(|w| !w.tx_witness.is_empty()));

    let buy_order = buyer
        .build_buy_order(&buy_request(sell_order, 10))
        .await
        .unwrap();
    let bought = BuyOrderEnvelope::decode(&buy_order).unwrap();
    let packet = VirtualPacket::from_bytes(&bought.vpacket).unwrap();

    assert_eq!(packet.snapshot_witnesses(), before);
    let asset = packet.outputs[0].asset.as_ref().unwrap();
    assert_eq!(asset.script_key, packet.outputs[0].script_key);
}

#[tokio::test]
async fn buy_order_rejects_excess_fee_rate_without_calls() {
    let buyer = buyer();
    let err = buyer
        .build_buy_order(&buy_request("not even an envelope".into(), 501))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::FeeRateExceeded { fee_rate: 501, .. }));
    assert!(buyer.wallet().calls().is_empty());
    assert!(buyer.assets().calls().is_empty());
}

#[tokio::test]
async fn buy_order_rejects_tampered_anchor_before_signing() {
    let seller = seller(10);
    let buyer = buyer();

    let sell_order = seller
        .build_sell_order(&sell_request(10, 5000, 10))
        .await
        .unwrap();
    let mut envelope = SellOrderEnvelope::decode(&sell_order).unwrap();
    let mut anchor = decode_psbt(&envelope.anchor_psbt).unwrap();
    let mut extra = anchor.unsigned_tx.input[0].clone();
    extra.previous_output.vout = 7;
    anchor.unsigned_tx.input.push(extra);
    anchor.inputs.push(Default::default());
    envelope.anchor_psbt = encode_psbt(&anchor);

    let err = buyer
        .build_buy_order(&buy_request(envelope.encode().unwrap(), 10))
        .await
        .unwrap_err();
    match err {
        Error::Invariant(InvariantViolation::Length {
            what,
            expected,
            actual,
        }) => {
            assert_eq!(what, "committed anchor inputs");
            assert_eq!(expected, 2);
            assert_eq!(actual, 3);
        }
        other => panic!("expected invariant violation, got {other:?}"),
    }
    let wallet_calls = buyer.wallet().calls();
    assert!(!wallet_calls.contains(&"sign_psbt"));
    assert!(!wallet_calls.contains(&"finalize_psbt"));
}

#[tokio::test]
async fn buy_order_rejects_commit_that_redirects_the_asset() {
    let seller = seller(10);
    let buyer = buyer();
    let sell_order = seller
        .build_sell_order(&sell_request(10, 5000, 10))
        .await
        .unwrap();

    buyer
        .assets()
        .tamper_committed_virtual(|packet| packet.outputs[0].script_key = test_key(0x99));
    let err = buyer
        .build_buy_order(&buy_request(sell_order, 10))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Invariant(InvariantViolation::Mismatch {
            what: "output 0 script key",
            ..
        })
    ));
    assert!(!buyer.wallet().calls().contains(&"sign_psbt"));
}

#[tokio::test]
async fn buy_order_rejects_commit_that_rekeys_the_prepared_asset() {
    let seller = seller(10);
    let buyer = buyer();
    let sell_order = seller
        .build_sell_order(&sell_request(10, 5000, 10))
        .await
        .unwrap();

    buyer.assets().tamper_committed_virtual(|packet| {
        let foreign = test_key(0x99);
        packet.outputs[0].script_key = foreign;
        if let Some(asset) = packet.outputs[0].asset.as_mut() {
            asset.script_key = foreign;
        }
    });
    let err = buyer
        .build_buy_order(&buy_request(sell_order, 10))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Invariant(InvariantViolation::Mismatch {
            what: "committed output 0 script key",
            ..
        })
    ));
}

#[tokio::test]
async fn buy_order_rejects_commit_with_extra_outputs() {
    let seller = seller(10);
    let buyer = buyer();
    let sell_order = seller
        .build_sell_order(&sell_request(10, 5000, 10))
        .await
        .unwrap();

    buyer.assets().tamper_committed_virtual(|packet| {
        let extra = packet.outputs[0].clone();
        packet.outputs.push(extra.clone());
        packet.outputs.push(extra);
    });
    let err = buyer
        .build_buy_order(&buy_request(sell_order, 10))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Invariant(InvariantViolation::LengthNotIn {
            what: "virtual outputs",
            actual: 3,
            ..
        })
    ));
}

#[tokio::test]
async fn buy_order_requires_wallet_to_sign_its_input() {
    let seller = seller(10);
    let buyer = buyer();
    let sell_order = seller
        .build_sell_order(&sell_request(10, 5000, 10))
        .await
        .unwrap();

    buyer.wallet().withhold_signatures();
    let err = buyer
        .build_buy_order(&buy_request(sell_order, 10))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Invariant(InvariantViolation::Missing {
            what: "wallet signed inputs",
            ..
        })
    ));
    assert!(!buyer.wallet().calls().contains(&"finalize_psbt"));
}

#[tokio::test]
async fn buy_order_rejects_bad_courier_host() {
    let seller = seller(10);
    let buyer = buyer();
    let sell_order = seller
        .build_sell_order(&sell_request(10, 5000, 10))
        .await
        .unwrap();
    let mut request = buy_request(sell_order, 10);
    request.proof_courier_host = "https://proofs.example".into();
    assert!(matches!(
        buyer.build_buy_order(&request).await,
        Err(Error::InvalidCourierHost(_))
    ));
    assert!(buyer.wallet().calls().is_empty());
}

#[tokio::test]
async fn buy_order_rejects_sell_envelope_of_wrong_kind() {
    let buyer = buyer();
    let bogus = BuyOrderEnvelope {
        anchor_psbt: Vec::new(),
        vpacket: Vec::new(),
        commit: tapswap_sdk::CommitResponse {
            anchor_psbt: Vec::new(),
            virtual_packets: Vec::new(),
            change_output_index: -1,
            locked_utxos: Vec::new(),
        },
        script_key: Vec::new(),
        outpoint: String::new(),
    };
    let err = buyer
        .build_buy_order(&buy_request(bogus.encode().unwrap(), 10))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::WrongEnvelopeKind { .. }));
}

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publish_surfaces_service_failure() {
    let seller = seller(10);
    let buyer = buyer();
    let sell_order = seller
        .build_sell_order(&sell_request(10, 5000, 10))
        .await
        .unwrap();
    let buy_order = buyer
        .build_buy_order(&buy_request(sell_order, 10))
        .await
        .unwrap();

    seller.assets().fail_on("publish_and_log");
    let err = seller.publish(&buy_order).await.unwrap_err();
    assert!(matches!(err, Error::Service { op: "publish_and_log", .. }));
    assert!(seller.assets().published().is_empty());
}

#[tokio::test]
async fn publish_rejects_unreadable_virtual_packet() {
    let seller = seller(10);
    let buyer = buyer();
    let sell_order = seller
        .build_sell_order(&sell_request(10, 5000, 10))
        .await
        .unwrap();
    let buy_order = buyer
        .build_buy_order(&buy_request(sell_order, 10))
        .await
        .unwrap();

    let mut envelope = BuyOrderEnvelope::decode(&buy_order).unwrap();
    envelope.vpacket = b"{}".to_vec();
    let err = seller.publish(&envelope.encode().unwrap()).await.unwrap_err();
    assert!(matches!(err, Error::VirtualPacket(_)));
    assert!(seller.assets().calls().iter().all(|op| *op != "publish_and_log"));
}
