//! Synthetic record generation.
//!
//! Keys are a pure function of the row index, so an update can re-target an
//! existing row by regenerating its keys. Everything random comes from a seeded
//! [`StdRng`], so two generators with the same seed and anchor produce the same
//! sequence.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use crate::record::{Payload, Record};

/// Templates for `(key_a, key_b)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTemplate {
  pub key_a_prefix: String,
  pub key_b_prefix: String,
}

impl Default for KeyTemplate {
  fn default() -> Self {
    Self {
      key_a_prefix: "feature_def_ref_".to_string(),
      key_b_prefix: "entity_id_".to_string(),
    }
  }
}

impl KeyTemplate {
  pub fn keys_for(&self, row: u64) -> (String, String) {
    (
      format!("{}{row}", self.key_a_prefix),
      format!("{}{row}", self.key_b_prefix),
    )
  }
}

pub struct Generator {
  rng: StdRng,
  anchor: DateTime<Utc>,
  template: KeyTemplate,
  value: Payload,
}

impl Generator {
  pub fn new(seed: u64, anchor: DateTime<Utc>) -> Self {
    Self {
      rng: StdRng::seed_from_u64(seed),
      anchor,
      template: KeyTemplate::default(),
      value: Payload::Text("value_str".to_string()),
    }
  }

  pub fn with_template(mut self, template: KeyTemplate) -> Self {
    self.template = template;
    self
  }

  pub fn template(&self) -> &KeyTemplate {
    &self.template
  }

  pub fn anchor(&self) -> DateTime<Utc> {
    self.anchor
  }

  pub fn rng(&mut self) -> &mut StdRng {
    &mut self.rng
  }

  /// Record for `row` with a random `active` flag.
  pub fn record(&mut self, row: u64) -> Record {
    let active = self.rng.gen::<bool>();
    self.build(row, active)
  }

  /// Replacement record for `row`, always active.
  pub fn update_record(&mut self, row: u64) -> Record {
    self.build(row, true)
  }

  pub fn records(&mut self, start: u64, count: usize) -> Records<'_> {
    Records {
      generator: self,
      next: start,
      end: start + count as u64,
    }
  }

  pub fn batches(&mut self, start: u64, count: usize, batch_size: usize) -> Batches<Records<'_>> {
    Batches::new(self.records(start, count), batch_size)
  }

  fn build(&mut self, row: u64, active: bool) -> Record {
    let (key_a, key_b) = self.template.keys_for(row);
    let correlation_id = random_uuid(&mut self.rng);
    let created_at = self.anchor + Duration::days(self.rng.gen_range(-10..10));
    let expires_at = created_at + Duration::days(self.rng.gen_range(1..8));

    Record {
      key_a,
      key_b,
      value: self.value.clone(),
      active,
      correlation_id,
      created_at,
      expires_at,
    }
  }
}

/// Version 4 UUID drawn from `rng` rather than the OS, so seeded runs repeat.
pub fn random_uuid(rng: &mut impl Rng) -> Uuid {
  uuid::Builder::from_random_bytes(rng.gen()).into_uuid()
}

pub struct Records<'a> {
  generator: &'a mut Generator,
  next: u64,
  end: u64,
}

impl Iterator for Records<'_> {
  type Item = Record;

  fn next(&mut self) -> Option<Record> {
    if self.next >= self.end {
      return None;
    }
    let row = self.next;
    self.next += 1;
    Some(self.generator.record(row))
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    let len = (self.end - self.next) as usize;
    (len, Some(len))
  }
}

/// Groups an iterator into `Vec`s of at most `size` items.
pub struct Batches<I> {
  inner: I,
  size: usize,
}

impl<I: Iterator> Batches<I> {
  pub fn new(inner: I, size: usize) -> Self {
    Self {
      inner,
      size: size.max(1),
    }
  }
}

impl<I: Iterator> Iterator for Batches<I> {
  type Item = Vec<I::Item>;

  fn next(&mut self) -> Option<Self::Item> {
    let mut batch = Vec::with_capacity(self.size);
    for item in self.inner.by_ref() {
      batch.push(item);
      if batch.len() == self.size {
        break;
      }
    }
    if batch.is_empty() {
      None
    } else {
      Some(batch)
    }
  }
}
