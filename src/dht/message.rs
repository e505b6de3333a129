use std::collections::BTreeMap;

use bytes::Bytes;

use super::error::DhtError;
use super::node::{Node, NodeId, COMPACT_NODE_LEN};
use super::record::{clamped_sequence, MutableRecord, TargetKey};
use crate::bencode::{decode, encode, Value};

pub type TransactionId = Bytes;

/// KRPC queries understood by [`DhtNode`](super::DhtNode).
#[derive(Debug, Clone)]
pub enum DhtQuery {
    Ping,
    FindNode {
        target: NodeId,
    },
    /// BEP-44 `get`. With `seq`, the value is only returned if newer.
    Get {
        target: TargetKey,
        seq: Option<u64>,
    },
    /// BEP-44 `put` of a mutable record.
    Put {
        record: MutableRecord,
        token: Bytes,
        cas: Option<u64>,
    },
}

impl DhtQuery {
    pub fn name(&self) -> &'static str {
        match self {
            DhtQuery::Ping => "ping",
            DhtQuery::FindNode { .. } => "find_node",
            DhtQuery::Get { .. } => "get",
            DhtQuery::Put { .. } => "put",
        }
    }
}

#[derive(Debug, Clone)]
pub enum DhtResponse {
    /// Reply to `ping` and `put`.
    Ack { id: NodeId },
    FindNode {
        id: NodeId,
        nodes: Vec<Node>,
    },
    Get {
        id: NodeId,
        token: Bytes,
        nodes: Vec<Node>,
        record: Option<MutableRecord>,
    },
    Error {
        code: i64,
        message: String,
    },
}

impl DhtResponse {
    pub fn error(code: i64, message: &str) -> Self {
        DhtResponse::Error {
            code,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum DhtMessage {
    Query {
        transaction_id: TransactionId,
        sender_id: NodeId,
        query: DhtQuery,
    },
    Response {
        transaction_id: TransactionId,
        response: DhtResponse,
    },
}

impl DhtMessage {
    pub fn query(transaction_id: TransactionId, sender_id: NodeId, query: DhtQuery) -> Self {
        DhtMessage::Query {
            transaction_id,
            sender_id,
            query,
        }
    }

    pub fn response(transaction_id: TransactionId, response: DhtResponse) -> Self {
        DhtMessage::Response {
            transaction_id,
            response,
        }
    }

    pub fn transaction_id(&self) -> &TransactionId {
        match self {
            DhtMessage::Query { transaction_id, .. } | DhtMessage::Response { transaction_id, .. } => {
                transaction_id
            }
        }
    }

    /// Id of the sending node, when the message carries one.
    pub fn sender_id(&self) -> Option<NodeId> {
        match self {
            DhtMessage::Query { sender_id, .. } => Some(*sender_id),
            DhtMessage::Response { response, .. } => match response {
                DhtResponse::Ack { id }
                | DhtResponse::FindNode { id, .. }
                | DhtResponse::Get { id, .. } => Some(*id),
                DhtResponse::Error { .. } => None,
            },
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self, DhtError> {
        let value = decode(data)?;
        let dict = value
            .as_dict()
            .ok_or_else(|| invalid("expected dict"))?;

        let transaction_id = dict
            .get(b"t".as_slice())
            .and_then(Value::as_bytes)
            .cloned()
            .ok_or_else(|| invalid("missing transaction id"))?;

        match dict.get(b"y".as_slice()).and_then(Value::as_str) {
            Some("q") => Self::parse_query(transaction_id, dict),
            Some("r") => Self::parse_response(transaction_id, dict),
            Some("e") => Self::parse_error(transaction_id, dict),
            Some(other) => Err(DhtError::InvalidMessage(format!(
                "unknown message type: {other}"
            ))),
            None => Err(invalid("missing message type")),
        }
    }

    fn parse_query(
        transaction_id: TransactionId,
        dict: &BTreeMap<Bytes, Value>,
    ) -> Result<Self, DhtError> {
        let name = dict
            .get(b"q".as_slice())
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("missing query name"))?;
        let args = dict
            .get(b"a".as_slice())
            .and_then(Value::as_dict)
            .ok_or_else(|| invalid("missing query args"))?;
        let sender_id = args
            .get(b"id".as_slice())
            .and_then(Value::as_bytes)
            .ok_or_else(|| invalid("missing sender id"))
            .and_then(|b| NodeId::from_bytes(b))?;

        let target_bytes = || {
            args.get(b"target".as_slice())
                .and_then(Value::as_bytes)
                .ok_or_else(|| invalid("missing target"))
        };
        let optional_seq = |key: &[u8]| {
            args.get(key)
                .and_then(Value::as_integer)
                .and_then(|seq| u64::try_from(seq).ok())
        };

        let query = match name {
            "ping" => DhtQuery::Ping,
            "find_node" => DhtQuery::FindNode {
                target: NodeId::from_bytes(target_bytes()?)?,
            },
            "get" => DhtQuery::Get {
                target: TargetKey::from_bytes(target_bytes()?)?,
                seq: optional_seq(&b"seq"[..]),
            },
            "put" => DhtQuery::Put {
                record: MutableRecord::read_fields(args)?
                    .ok_or_else(|| invalid("put without value"))?,
                token: args
                    .get(b"token".as_slice())
                    .and_then(Value::as_bytes)
                    .cloned()
                    .ok_or_else(|| invalid("missing token"))?,
                cas: optional_seq(&b"cas"[..]),
            },
            other => return Err(DhtError::InvalidMessage(format!("unknown query: {other}"))),
        };

        Ok(Self::query(transaction_id, sender_id, query))
    }

    fn parse_response(
        transaction_id: TransactionId,
        dict: &BTreeMap<Bytes, Value>,
    ) -> Result<Self, DhtError> {
        let body = dict
            .get(b"r".as_slice())
            .and_then(Value::as_dict)
            .ok_or_else(|| invalid("missing response dict"))?;
        let id = body
            .get(b"id".as_slice())
            .and_then(Value::as_bytes)
            .ok_or_else(|| invalid("missing id in response"))
            .and_then(|b| NodeId::from_bytes(b))?;

        let nodes = body
            .get(b"nodes".as_slice())
            .and_then(Value::as_bytes)
            .map(|data| {
                data.chunks_exact(COMPACT_NODE_LEN)
                    .filter_map(Node::from_compact)
                    .collect::<Vec<_>>()
            });
        let token = body.get(b"token".as_slice()).and_then(Value::as_bytes).cloned();

        let response = match (token, nodes) {
            (Some(token), nodes) => DhtResponse::Get {
                id,
                token,
                nodes: nodes.unwrap_or_default(),
                record: MutableRecord::read_fields(body)?,
            },
            (None, Some(nodes)) => DhtResponse::FindNode { id, nodes },
            (None, None) => DhtResponse::Ack { id },
        };
        Ok(Self::response(transaction_id, response))
    }

    fn parse_error(
        transaction_id: TransactionId,
        dict: &BTreeMap<Bytes, Value>,
    ) -> Result<Self, DhtError> {
        let error = dict
            .get(b"e".as_slice())
            .and_then(Value::as_list)
            .ok_or_else(|| invalid("missing error list"))?;

        let code = error.first().and_then(Value::as_integer).unwrap_or(0);
        let message = error
            .get(1)
            .and_then(Value::as_str)
            .unwrap_or("unknown error");

        Ok(Self::response(transaction_id, DhtResponse::error(code, message)))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut dict = BTreeMap::new();
        dict.insert(
            Bytes::from_static(b"t"),
            Value::Bytes(self.transaction_id().clone()),
        );

        match self {
            DhtMessage::Query {
                sender_id, query, ..
            } => {
                dict.insert(Bytes::from_static(b"y"), Value::string("q"));
                dict.insert(Bytes::from_static(b"q"), Value::string(query.name()));

                let mut args = BTreeMap::new();
                args.insert(Bytes::from_static(b"id"), id_value(sender_id));
                match query {
                    DhtQuery::Ping => {}
                    DhtQuery::FindNode { target } => {
                        args.insert(Bytes::from_static(b"target"), id_value(target));
                    }
                    DhtQuery::Get { target, seq } => {
                        args.insert(
                            Bytes::from_static(b"target"),
                            Value::Bytes(Bytes::copy_from_slice(target.as_bytes())),
                        );
                        if let Some(seq) = seq {
                            args.insert(Bytes::from_static(b"seq"), clamped_sequence(*seq));
                        }
                    }
                    DhtQuery::Put { record, token, cas } => {
                        record.write_fields(&mut args);
                        args.insert(Bytes::from_static(b"token"), Value::Bytes(token.clone()));
                        if let Some(cas) = cas {
                            args.insert(Bytes::from_static(b"cas"), clamped_sequence(*cas));
                        }
                    }
                }
                dict.insert(Bytes::from_static(b"a"), Value::Dict(args));
            }
            DhtMessage::Response {
                response: DhtResponse::Error { code, message },
                ..
            } => {
                dict.insert(Bytes::from_static(b"y"), Value::string("e"));
                dict.insert(
                    Bytes::from_static(b"e"),
                    Value::List(vec![Value::Integer(*code), Value::string(message)]),
                );
            }
            DhtMessage::Response { response, .. } => {
                dict.insert(Bytes::from_static(b"y"), Value::string("r"));

                let mut body = BTreeMap::new();
                match response {
                    DhtResponse::Ack { id } => {
                        body.insert(Bytes::from_static(b"id"), id_value(id));
                    }
                    DhtResponse::FindNode { id, nodes } => {
                        body.insert(Bytes::from_static(b"id"), id_value(id));
                        body.insert(Bytes::from_static(b"nodes"), compact_nodes(nodes));
                    }
                    DhtResponse::Get {
                        id,
                        token,
                        nodes,
                        record,
                    } => {
                        body.insert(Bytes::from_static(b"id"), id_value(id));
                        body.insert(Bytes::from_static(b"token"), Value::Bytes(token.clone()));
                        body.insert(Bytes::from_static(b"nodes"), compact_nodes(nodes));
                        if let Some(record) = record {
                            record.write_fields(&mut body);
                        }
                    }
                    DhtResponse::Error { .. } => {}
                }
                dict.insert(Bytes::from_static(b"r"), Value::Dict(body));
            }
        }

        encode(&Value::Dict(dict))
    }
}

fn invalid(reason: &str) -> DhtError {
    DhtError::InvalidMessage(reason.to_string())
}

fn id_value(id: &NodeId) -> Value {
    Value::Bytes(Bytes::copy_from_slice(id.as_bytes()))
}

fn compact_nodes(nodes: &[Node]) -> Value {
    let compact: Vec<u8> = nodes
        .iter()
        .filter_map(Node::to_compact)
        .flatten()
        .collect();
    Value::Bytes(Bytes::from(compact))
}
