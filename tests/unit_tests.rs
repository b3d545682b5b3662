use heapless::Vec;
use lorawan::lorawan::commands::{
    channel_mask_from_indices, enabled_channels_from_mask, write_commands, CommandError,
    CommandType, Direction, MacCommand, MacCommandIterator, MAX_ENCODED_FREQUENCY,
};

use mock::downlink;

fn sample_commands() -> [MacCommand; 18] {
    [
        MacCommand::LinkCheckReq,
        MacCommand::LinkCheckAns {
            margin: 20,
            gateway_count: 2,
        },
        MacCommand::link_adr_req(5, 3, 0x00FF, 6, 2).unwrap(),
        MacCommand::LinkADRAns {
            power_ack: true,
            data_rate_ack: false,
            channel_mask_ack: true,
        },
        MacCommand::duty_cycle_req(10).unwrap(),
        MacCommand::DutyCycleAns,
        MacCommand::rx_param_setup_req(3, 2, 869_525_000).unwrap(),
        MacCommand::RXParamSetupAns {
            rx1_dr_offset_ack: false,
            rx2_data_rate_ack: true,
            channel_ack: true,
        },
        MacCommand::DevStatusReq,
        MacCommand::dev_status_ans(180, -7).unwrap(),
        MacCommand::new_channel_req(4, 867_100_000, 0, 5).unwrap(),
        MacCommand::NewChannelAns {
            channel_freq_ok: true,
            data_rate_ok: false,
        },
        MacCommand::rx_timing_setup_req(3).unwrap(),
        MacCommand::RXTimingSetupAns,
        MacCommand::tx_param_setup_req(true, false, 9).unwrap(),
        MacCommand::TxParamSetupAns,
        MacCommand::dl_channel_req(2, 869_100_000).unwrap(),
        MacCommand::DlChannelAns {
            channel_freq_ok: false,
            uplink_freq_exists: true,
        },
    ]
}

#[test]
fn test_every_command_survives_encoding() {
    for command in sample_commands() {
        let bytes = command.to_bytes();
        assert_eq!(bytes.len(), command.wire_len());
        assert_eq!(bytes[0], command.cid());

        let direction = command.command_type().direction();
        let (parsed, consumed) = MacCommand::from_bytes(direction, &bytes).unwrap();
        assert_eq!(parsed, command);
        assert_eq!(consumed, command.command_type().payload_len() + 1);
    }
}

fn assert_survives_encoding(command: MacCommand) {
    let bytes = command.to_bytes();
    let direction = command.command_type().direction();
    assert_eq!(
        MacCommand::from_bytes(direction, &bytes),
        Ok((command, command.wire_len())),
        "{}",
        command
    );
}

const FREQUENCIES: [u32; 4] = [0, 100, 868_100_000, MAX_ENCODED_FREQUENCY];
const BOOLS: [bool; 2] = [false, true];

#[test]
fn test_field_ranges_survive_encoding() {
    for data_rate in 0..=15 {
        for tx_power in 0..=15 {
            for nb_trans in 0..=15 {
                let command = MacCommand::link_adr_req(data_rate, tx_power, 0x00FF, 0, nb_trans);
                assert_survives_encoding(command.unwrap());
            }
        }
    }
    for ch_mask in [0, 0x0001, 0x8000, 0xFFFF] {
        for ch_mask_cntl in 0..=7 {
            let command = MacCommand::link_adr_req(15, 15, ch_mask, ch_mask_cntl, 15);
            assert_survives_encoding(command.unwrap());
        }
    }

    for value in 0..=15 {
        assert_survives_encoding(MacCommand::duty_cycle_req(value).unwrap());
        assert_survives_encoding(MacCommand::rx_timing_setup_req(value).unwrap());
        for downlink_dwell_time in BOOLS {
            for uplink_dwell_time in BOOLS {
                let command =
                    MacCommand::tx_param_setup_req(downlink_dwell_time, uplink_dwell_time, value);
                assert_survives_encoding(command.unwrap());
            }
        }
    }

    for freq in FREQUENCIES {
        for rx1_dr_offset in 0..=7 {
            for rx2_data_rate in 0..=15 {
                let command = MacCommand::rx_param_setup_req(rx1_dr_offset, rx2_data_rate, freq);
                assert_survives_encoding(command.unwrap());
            }
        }
        for ch_index in [0, 15, 255] {
            assert_survives_encoding(MacCommand::dl_channel_req(ch_index, freq).unwrap());
            for min_dr in 0..=15 {
                for max_dr in 0..=15 {
                    let command = MacCommand::new_channel_req(ch_index, freq, min_dr, max_dr);
                    assert_survives_encoding(command.unwrap());
                }
            }
        }
    }

    for battery in [0, 1, 254, 255] {
        for margin in -32..=31 {
            assert_survives_encoding(MacCommand::dev_status_ans(battery, margin).unwrap());
        }
    }
    for margin in [0, 255] {
        for gateway_count in [0, 255] {
            assert_survives_encoding(MacCommand::LinkCheckAns {
                margin,
                gateway_count,
            });
        }
    }

    for a in BOOLS {
        for b in BOOLS {
            for c in BOOLS {
                assert_survives_encoding(MacCommand::LinkADRAns {
                    power_ack: a,
                    data_rate_ack: b,
                    channel_mask_ack: c,
                });
                assert_survives_encoding(MacCommand::RXParamSetupAns {
                    rx1_dr_offset_ack: a,
                    rx2_data_rate_ack: b,
                    channel_ack: c,
                });
            }
            assert_survives_encoding(MacCommand::NewChannelAns {
                channel_freq_ok: a,
                data_rate_ok: b,
            });
            assert_survives_encoding(MacCommand::DlChannelAns {
                channel_freq_ok: a,
                uplink_freq_exists: b,
            });
        }
    }
}

#[test]
fn test_answer_types() {
    for ty in CommandType::ALL {
        match ty.answer() {
            Some(answer) => {
                assert_eq!(ty.direction(), Direction::Downlink);
                assert_eq!(answer.cid(), ty.cid());
                assert_eq!(answer.direction(), Direction::Uplink);
            }
            None => assert!(
                ty == CommandType::LinkCheckAns || ty.direction() == Direction::Uplink
            ),
        }
    }
}

#[test]
fn test_cid_lookup_is_a_bijection() {
    for ty in CommandType::ALL {
        assert_eq!(CommandType::from_cid(ty.cid(), ty.direction()), Some(ty));
    }
    // requests and answers share a CID but not a direction
    assert_eq!(
        CommandType::from_cid(0x03, Direction::Downlink),
        Some(CommandType::LinkADRReq)
    );
    assert_eq!(
        CommandType::from_cid(0x03, Direction::Uplink),
        Some(CommandType::LinkADRAns)
    );
    assert_eq!(CommandType::from_cid(0x01, Direction::Downlink), None);
    assert_eq!(CommandType::from_cid(0x80, Direction::Uplink), None);
}

#[test]
fn test_link_adr_req_wire_format() {
    let command = MacCommand::link_adr_req(5, 3, 0x0007, 0, 1).unwrap();
    assert_eq!(command.to_bytes().as_slice(), &[0x03, 0x53, 0x07, 0x00, 0x01]);

    let (parsed, _) =
        MacCommand::from_bytes(Direction::Downlink, &[0x03, 0x21, 0x01, 0x80, 0x62]).unwrap();
    assert_eq!(
        parsed,
        MacCommand::LinkADRReq {
            data_rate: 2,
            tx_power: 1,
            ch_mask: 0x8001,
            ch_mask_cntl: 6,
            nb_trans: 2,
        }
    );
}

#[test]
fn test_new_channel_req_wire_format() {
    let command = MacCommand::new_channel_req(3, 868_100_000, 0, 5).unwrap();
    assert_eq!(
        command.to_bytes().as_slice(),
        &[0x07, 0x03, 0x28, 0x76, 0x84, 0x50]
    );
}

#[test]
fn test_answer_flags() {
    let command = MacCommand::LinkADRAns {
        power_ack: true,
        data_rate_ack: true,
        channel_mask_ack: false,
    };
    assert_eq!(command.to_bytes().as_slice(), &[0x03, 0x06]);

    let command = MacCommand::DlChannelAns {
        channel_freq_ok: true,
        uplink_freq_exists: false,
    };
    assert_eq!(command.to_bytes().as_slice(), &[0x0A, 0x01]);
}

#[test]
fn test_checked_constructors_reject_out_of_range() {
    assert_eq!(
        MacCommand::link_adr_req(16, 0, 0, 0, 1),
        Err(CommandError::InvalidValue)
    );
    assert_eq!(MacCommand::duty_cycle_req(16), Err(CommandError::InvalidValue));
    assert_eq!(
        MacCommand::rx_param_setup_req(8, 0, 869_525_000),
        Err(CommandError::InvalidValue)
    );
    assert_eq!(
        MacCommand::dev_status_ans(0, 32),
        Err(CommandError::InvalidValue)
    );
    assert_eq!(
        MacCommand::new_channel_req(3, 868_100_050, 0, 5),
        Err(CommandError::InvalidValue)
    );
    assert_eq!(
        MacCommand::dl_channel_req(0, 1_677_721_600),
        Err(CommandError::InvalidValue)
    );
}

#[test]
fn test_truncated_command() {
    assert_eq!(
        MacCommand::from_bytes(Direction::Downlink, &[0x07, 0x03, 0x28]),
        Err(CommandError::Truncated {
            command: CommandType::NewChannelReq,
            expected: 5,
            available: 2,
        })
    );
    assert_eq!(
        MacCommand::from_bytes(Direction::Downlink, &[]),
        Err(CommandError::Empty)
    );
}

#[test]
fn test_channel_mask_helpers() {
    assert!(enabled_channels_from_mask(0).is_empty());
    assert_eq!(enabled_channels_from_mask(0b101).as_slice(), &[0, 2]);
    assert_eq!(enabled_channels_from_mask(0x0001).as_slice(), &[0]);
    assert_eq!(enabled_channels_from_mask(0x8000).as_slice(), &[15]);
    assert_eq!(enabled_channels_from_mask(0x00A5).as_slice(), &[0, 2, 5, 7]);
    assert_eq!(enabled_channels_from_mask(0xFFFF).len(), 16);

    assert_eq!(channel_mask_from_indices(&[]), 0);
    assert_eq!(channel_mask_from_indices(&[0, 2, 5, 7]), 0x00A5);
    assert_eq!(channel_mask_from_indices(&[15, 16, 40]), 0x8000);
}

#[test]
fn test_variant_helpers() {
    let command = MacCommand::link_adr_req(0, 0, 0b0110, 0, 1).unwrap();
    assert_eq!(command.enabled_channels().unwrap().as_slice(), &[1, 2]);
    assert_eq!(MacCommand::DevStatusReq.enabled_channels(), None);

    let command = MacCommand::duty_cycle_req(2).unwrap();
    assert_eq!(command.max_duty_cycle_fraction(), Some(0.25));

    let command = MacCommand::rx_timing_setup_req(0).unwrap();
    assert_eq!(command.rx1_delay(), Some(core::time::Duration::from_secs(1)));
    assert_eq!(MacCommand::RXTimingSetupAns.rx1_delay(), None);
}

#[test]
fn test_iterator_reads_back_to_back_commands() {
    let payload = downlink(&[
        MacCommand::LinkCheckAns {
            margin: 7,
            gateway_count: 1,
        },
        MacCommand::DevStatusReq,
        MacCommand::duty_cycle_req(3).unwrap(),
    ]);
    let commands: std::vec::Vec<_> = MacCommandIterator::new(Direction::Downlink, &payload)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(commands.len(), 3);
    assert_eq!(commands[1], MacCommand::DevStatusReq);
}

#[test]
fn test_iterator_stops_at_first_error() {
    // DevStatusReq, unknown CID 0x55, then a valid DutyCycleReq never reached
    let payload = [0x06, 0x55, 0x04, 0x01];
    let mut iter = MacCommandIterator::new(Direction::Downlink, &payload);
    assert_eq!(iter.next(), Some(Ok(MacCommand::DevStatusReq)));
    assert_eq!(iter.next(), Some(Err(CommandError::UnknownCid(0x55))));
    assert_eq!(iter.next(), None);

    // truncated trailing command
    let payload = [0x08, 0x01, 0x03, 0x53];
    let results: std::vec::Vec<_> = MacCommandIterator::new(Direction::Downlink, &payload).collect();
    assert_eq!(results.len(), 2);
    assert!(matches!(results[1], Err(CommandError::Truncated { .. })));
}

#[test]
fn test_write_commands_is_all_or_nothing() {
    let answers = [
        MacCommand::DutyCycleAns,
        MacCommand::dev_status_ans(255, 5).unwrap(),
        MacCommand::RXTimingSetupAns,
    ];

    let mut out: Vec<u8, 4> = Vec::new();
    assert_eq!(
        write_commands(&answers, &mut out),
        Err(CommandError::BufferTooSmall)
    );
    assert!(out.is_empty());

    let mut out: Vec<u8, 8> = Vec::new();
    assert_eq!(write_commands(&answers, &mut out), Ok(5));
    assert_eq!(out.as_slice(), &[0x04, 0x06, 0xFF, 0x05, 0x08]);
}

#[test]
fn test_display() {
    let command = MacCommand::link_adr_req(5, 3, 0x0007, 0, 1).unwrap();
    assert_eq!(
        format!("{}", command),
        "LinkADRReq(DataRate=5, TXPower=3, ChMask=0x0007, ChMaskCntl=0, NbTrans=1)"
    );
    assert_eq!(
        format!("{}", MacCommand::dev_status_ans(100, -3).unwrap()),
        "DevStatusAns(Battery=100, Margin=-3 dB)"
    );
    assert_eq!(
        format!("{}", CommandError::UnknownCid(0x55)),
        "unknown CID 0x55"
    );
}
