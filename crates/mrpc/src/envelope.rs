//! On-wire mrpc message shape, carried as the `payload` of an `mnet` packet.
//!
//! Built directly with `rmpv::Value` rather than a serde-derived struct —
//! an RPC call's argument list is itself a dynamic value, so there's no
//! fixed Rust type to derive `Serialize` for. Still a positional array on
//! the wire, in the same spirit as `mnet::packet`'s tuple framing.

use crate::value::RpcValue;
use rmpv::Value;

pub enum Envelope {
    Call { name: String, token: Option<u64>, wants_return: bool, args: Vec<RpcValue> },
    Reply { token: u64, values: Vec<RpcValue> },
}

const TAG_CALL: i64 = 0;
const TAG_REPLY: i64 = 1;

impl Envelope {
    fn to_value(&self) -> Value {
        match self {
            Envelope::Call { name, token, wants_return, args } => Value::Array(vec![
                Value::from(TAG_CALL),
                Value::from(name.as_str()),
                (*token).map(Value::from).unwrap_or(Value::Nil),
                Value::from(*wants_return),
                Value::Array(args.clone()),
            ]),
            Envelope::Reply { token, values } => Value::Array(vec![
                Value::from(TAG_REPLY),
                Value::from(*token),
                Value::Array(values.clone()),
            ]),
        }
    }

    fn from_value(value: Value) -> Option<Self> {
        let items = value.as_array()?;
        let tag = items.first()?.as_i64()?;
        match tag {
            TAG_CALL => {
                let name = items.get(1)?.as_str()?.to_string();
                let token = items.get(2)?.as_u64();
                let wants_return = items.get(3)?.as_bool()?;
                let args = items.get(4)?.as_array()?.clone();
                Some(Envelope::Call { name, token, wants_return, args })
            }
            TAG_REPLY => {
                let token = items.get(1)?.as_u64()?;
                let values = items.get(2)?.as_array()?.clone();
                Some(Envelope::Reply { token, values })
            }
            _ => None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &self.to_value()).expect("encoding to a Vec<u8> never fails");
        buf
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let mut cursor = bytes;
        let value = rmpv::decode::read_value(&mut cursor).ok()?;
        Self::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_round_trips() {
        let env = Envelope::Call {
            name: "stor_extract".to_string(),
            token: Some(42),
            wants_return: true,
            args: vec![RpcValue::Nil, RpcValue::from(10_001)],
        };
        let bytes = env.encode();
        match Envelope::decode(&bytes).unwrap() {
            Envelope::Call { name, token, wants_return, args } => {
                assert_eq!(name, "stor_extract");
                assert_eq!(token, Some(42));
                assert!(wants_return);
                assert_eq!(args, vec![RpcValue::Nil, RpcValue::from(10_001)]);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn reply_round_trips() {
        let env = Envelope::Reply { token: 7, values: vec![RpcValue::from("results")] };
        let bytes = env.encode();
        match Envelope::decode(&bytes).unwrap() {
            Envelope::Reply { token, values } => {
                assert_eq!(token, 7);
                assert_eq!(values, vec![RpcValue::from("results")]);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Envelope::decode(&[0xc1, 0xff]).is_none());
    }
}
