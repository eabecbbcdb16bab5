//! Property tests: random operation sequences checked against a plain
//! reference model of custody.

use std::sync::Arc;

use proptest::prelude::*;

use custody_ledger::InMemoryStore;
use custody_types::{BatchId, MetadataRef, PartyId};

use crate::{CustodyError, CustodyMachine, Rejection};

const PARTIES: [&str; 3] = ["mfg-addr", "log-addr", "ret-addr"];

#[derive(Clone, Debug)]
enum Action {
    Register(usize),
    Initiate { by: usize, to: usize },
    Accept(usize),
    Violate(usize),
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0..3usize).prop_map(Action::Register),
        (0..3usize, 0..3usize).prop_map(|(by, to)| Action::Initiate { by, to }),
        (0..3usize).prop_map(Action::Accept),
        (0..3usize).prop_map(Action::Violate),
    ]
}

#[derive(Clone, Debug, Default)]
struct Model {
    owner: Option<usize>,
    pending: Option<usize>,
    violation: Option<String>,
}

impl Model {
    /// Expected rejection code, or `None` if the action should succeed.
    fn apply(&mut self, action: &Action, step: usize) -> Option<&'static str> {
        match (action, self.owner) {
            (Action::Register(who), None) => {
                self.owner = Some(*who);
                None
            }
            (Action::Register(_), Some(_)) => Some("already_exists"),
            (_, None) => Some("not_found"),
            (Action::Initiate { by, to }, Some(owner)) => {
                if *by != owner {
                    Some("not_owner")
                } else if self.pending.is_some() {
                    Some("transfer_already_pending")
                } else if *to == owner {
                    Some("invalid_input")
                } else {
                    self.pending = Some(*to);
                    None
                }
            }
            (Action::Accept(who), Some(_)) => match self.pending {
                None => Some("no_pending_transfer"),
                Some(p) if p != *who => Some("not_designated_recipient"),
                Some(p) => {
                    self.owner = Some(p);
                    self.pending = None;
                    None
                }
            },
            (Action::Violate(_), Some(_)) => {
                self.violation = Some(format!("violation {step}"));
                None
            }
        }
    }
}

fn party(i: usize) -> PartyId {
    PartyId::from(PARTIES[i])
}

async fn run(machine: &CustodyMachine, batch: &BatchId, action: &Action, step: usize) -> Result<(), CustodyError> {
    match action {
        Action::Register(who) => machine
            .register(batch, &MetadataRef::from("ipfs://abc"), &party(*who))
            .await
            .map(|_| ()),
        Action::Initiate { by, to } => machine
            .initiate_transfer(batch, &party(*to), &party(*by))
            .await
            .map(|_| ()),
        Action::Accept(who) => machine.accept_transfer(batch, &party(*who)).await.map(|_| ()),
        Action::Violate(who) => machine
            .report_violation(batch, &format!("violation {step}"), &party(*who))
            .await
            .map(|_| ()),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn machine_matches_reference_model(actions in prop::collection::vec(action(), 1..24)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let machine = CustodyMachine::with_defaults(Arc::new(InMemoryStore::new()));
            let batch = BatchId::from("batch-1");
            let mut model = Model::default();
            let mut committed = 0u64;

            for (step, action) in actions.iter().enumerate() {
                let expected = model.apply(action, step);
                let result = run(&machine, &batch, action, step).await;
                match (expected, result) {
                    (None, Ok(())) => committed += 1,
                    (Some(code), Err(err)) => {
                        let rejection: Option<&Rejection> = err.rejection();
                        prop_assert!(rejection.is_some(), "unexpected failure {err:?}");
                        prop_assert_eq!(err.code(), code);
                    }
                    (expected, result) => {
                        prop_assert!(false, "step {step} {action:?}: expected {expected:?}, got {result:?}");
                    }
                }

                let status = machine.get_status(&batch).await.unwrap();
                prop_assert_eq!(status.exists, model.owner.is_some());
                prop_assert_eq!(status.owner, model.owner.map(party));
                prop_assert_eq!(status.pending_owner, model.pending.map(party));
                prop_assert_eq!(status.violation, model.violation.clone());
                prop_assert_eq!(status.handover_pending, model.pending.is_some());
            }

            if committed > 0 {
                let report = machine.verify(&batch).await.unwrap();
                prop_assert!(report.is_valid());
                prop_assert_eq!(report.entry_count, committed);
            }
            Ok(())
        })?;
    }
}
